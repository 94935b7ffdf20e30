//! Controller-specific error types.
//!
//! Every error carries an explicit kind so classification is a total match,
//! not a runtime type probe. The class decides how the work queue reacts:
//! configuration errors are terminal until the user corrects the spec,
//! everything else retries with backoff.

use thiserror::Error;

use cluster_store::StoreError;

use crate::reconciler::certificates::CertificateError;
use crate::render::RenderError;

/// How an error should drive retry and condition derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The spec or values document is invalid; retrying without a user
    /// correction cannot succeed
    Configuration,

    /// Conflicts, timeouts, and other transient cluster failures
    Transient,

    /// Unexpected failures, surfaced as Failed and retried
    Internal,
}

/// Errors that can occur in the TraceStack controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Invalid configuration detected outside the renderer
    #[error("invalid configuration: {message}")]
    Configuration {
        /// Condition reason
        reason: String,
        /// Human-readable detail
        message: String,
    },

    /// Rendering the values document failed
    #[error("render failed: {0}")]
    Render(#[from] RenderError),

    /// Cluster store error
    #[error("cluster store error: {0}")]
    Store(#[from] StoreError),

    /// Kubernetes client error outside the store abstraction
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Certificate provisioning failed
    #[error("certificate provisioning failed: {0}")]
    Certificates(#[from] CertificateError),

    /// Resource watch failed
    #[error("resource watch failed: {0}")]
    Watch(String),

    /// Unexpected internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl ControllerError {
    /// Classify this error; the match is total over both the variants and
    /// the nested store/certificate kinds.
    pub fn class(&self) -> ErrorClass {
        match self {
            ControllerError::Configuration { .. } | ControllerError::Render(_) => {
                ErrorClass::Configuration
            }
            ControllerError::Store(_) | ControllerError::Kube(_) => ErrorClass::Transient,
            ControllerError::Certificates(err) => match err {
                CertificateError::Store(_) => ErrorClass::Transient,
                CertificateError::Pki(_) | CertificateError::Malformed { .. } => {
                    ErrorClass::Internal
                }
            },
            ControllerError::Watch(_) | ControllerError::Internal(_) => ErrorClass::Internal,
        }
    }

    /// Terminal errors suppress automatic retry until the spec changes.
    pub fn is_terminal(&self) -> bool {
        self.class() == ErrorClass::Configuration
    }

    /// Condition reason for configuration-class errors.
    pub fn condition_reason(&self) -> &str {
        match self {
            ControllerError::Configuration { reason, .. } => reason,
            _ => crate::reconciler::status::REASON_INVALID_CONFIGURATION,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_are_terminal() {
        let err = ControllerError::Configuration {
            reason: "InvalidConfiguration".to_string(),
            message: "bad values".to_string(),
        };
        assert_eq!(err.class(), ErrorClass::Configuration);
        assert!(err.is_terminal());

        let err = ControllerError::Render(RenderError::Validation("no image".to_string()));
        assert!(err.is_terminal());
    }

    #[test]
    fn store_errors_are_transient() {
        let err = ControllerError::Store(StoreError::Conflict("rv mismatch".to_string()));
        assert_eq!(err.class(), ErrorClass::Transient);
        assert!(!err.is_terminal());

        let err = ControllerError::Store(StoreError::Timeout("deadline".to_string()));
        assert_eq!(err.class(), ErrorClass::Transient);
    }

    #[test]
    fn internal_errors_retry() {
        let err = ControllerError::Internal("oops".to_string());
        assert_eq!(err.class(), ErrorClass::Internal);
        assert!(!err.is_terminal());
    }
}
