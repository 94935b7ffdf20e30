//! Prints the TraceStack CRD manifest as YAML.
//!
//! Usage: `cargo run --bin crdgen > deploy/crds/tracestack.yaml`

use kube::CustomResourceExt;

fn main() -> Result<(), serde_yaml::Error> {
    print!("{}", serde_yaml::to_string(&crds::TraceStack::crd())?);
    Ok(())
}
