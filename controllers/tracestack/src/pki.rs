//! Internal PKI for component mTLS.
//!
//! The controller acts as a private certificate authority per instance: it
//! generates a self-signed CA and signs one leaf certificate per component.
//! Leaves carry both serverAuth and clientAuth so components can
//! authenticate each other in either direction.
//!
//! Certificates are reissued once 80% of their lifetime has passed, so a
//! renewed credential is always in place well before the old one expires.

use rcgen::{
    string::Ia5String, BasicConstraints, CertificateParams, DistinguishedName, DnType, DnValue,
    ExtendedKeyUsagePurpose, IsCa, Issuer, KeyPair, KeyUsagePurpose, SanType,
};
use thiserror::Error;
use x509_parser::prelude::*;

/// Validity period of a generated CA certificate.
pub const CA_VALIDITY_DAYS: i64 = 365;

/// Validity period of a component leaf certificate.
pub const LEAF_VALIDITY_DAYS: i64 = 30;

/// Fraction of a certificate's lifetime after which it is reissued.
pub const RENEWAL_THRESHOLD: f64 = 0.80;

/// PKI errors
#[derive(Debug, Error)]
pub enum PkiError {
    /// Key generation failed
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// Certificate generation or signing failed
    #[error("certificate generation failed: {0}")]
    CertificateGeneration(String),

    /// Certificate or key parsing failed
    #[error("certificate parsing failed: {0}")]
    Parse(String),
}

/// Result type for PKI operations
pub type Result<T> = std::result::Result<T, PkiError>;

/// Compute a validity window starting now.
fn compute_validity(days: i64) -> (::time::OffsetDateTime, ::time::OffsetDateTime) {
    let now = ::time::OffsetDateTime::now_utc();
    (now, now + ::time::Duration::days(days))
}

/// Current time as a Unix timestamp.
pub fn unix_now() -> i64 {
    ::time::OffsetDateTime::now_utc().unix_timestamp()
}

/// Parse PEM-encoded data and return the DER bytes.
pub fn parse_pem(pem_data: &str) -> Result<Vec<u8>> {
    let pem_obj = ::pem::parse(pem_data.as_bytes())
        .map_err(|e| PkiError::Parse(format!("failed to parse PEM: {e}")))?;
    Ok(pem_obj.contents().to_vec())
}

/// Validity window and subject of a parsed certificate.
#[derive(Debug, Clone)]
pub struct CertificateInfo {
    /// When the certificate becomes valid (Unix timestamp)
    pub not_before: i64,

    /// When the certificate expires (Unix timestamp)
    pub not_after: i64,

    /// Subject common name
    pub common_name: String,
}

impl CertificateInfo {
    /// Parse certificate info from a PEM-encoded certificate.
    pub fn from_pem(pem_data: &str) -> Result<Self> {
        let der = parse_pem(pem_data)?;
        Self::from_der(&der)
    }

    /// Parse certificate info from a DER-encoded certificate.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| PkiError::Parse(format!("failed to parse certificate: {e}")))?;

        let common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .unwrap_or("")
            .to_string();

        Ok(Self {
            not_before: cert.validity().not_before.timestamp(),
            not_after: cert.validity().not_after.timestamp(),
            common_name,
        })
    }

    /// Total lifetime in seconds.
    pub fn lifetime_secs(&self) -> i64 {
        self.not_after - self.not_before
    }

    /// Whether the certificate is expired at `now`.
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.not_after
    }

    /// Whether the certificate is past the renewal threshold at `now`.
    ///
    /// Expired certificates always need renewal, as do certificates with a
    /// degenerate validity window.
    pub fn needs_renewal_at(&self, now: i64) -> bool {
        let lifetime = self.lifetime_secs();
        if lifetime <= 0 {
            return true;
        }
        let age = now - self.not_before;
        age as f64 / lifetime as f64 >= RENEWAL_THRESHOLD
    }
}

/// Certificate Authority for one trace stack instance.
#[derive(Clone)]
pub struct CertificateAuthority {
    /// CA key pair serialized as PEM (KeyPair is not Clone, so it is
    /// deserialized on each signing operation)
    ca_key_pem: String,

    /// PEM-encoded CA certificate for distribution
    ca_cert_pem: String,
}

impl CertificateAuthority {
    /// Create a new self-signed CA.
    pub fn generate(common_name: &str) -> Result<Self> {
        let mut params = CertificateParams::default();

        let mut dn = DistinguishedName::new();
        dn.push(
            DnType::CommonName,
            DnValue::Utf8String(common_name.to_string()),
        );
        params.distinguished_name = dn;

        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];

        let (not_before, not_after) = compute_validity(CA_VALIDITY_DAYS);
        params.not_before = not_before;
        params.not_after = not_after;

        let key_pair = KeyPair::generate()
            .map_err(|e| PkiError::KeyGeneration(format!("failed to generate CA key: {e}")))?;
        let ca_key_pem = key_pair.serialize_pem();

        let cert = params.self_signed(&key_pair).map_err(|e| {
            PkiError::CertificateGeneration(format!("failed to create CA cert: {e}"))
        })?;

        Ok(Self {
            ca_key_pem,
            ca_cert_pem: cert.pem(),
        })
    }

    /// Load a CA from PEM-encoded certificate and key.
    pub fn from_pem(cert_pem: &str, key_pem: &str) -> Result<Self> {
        let _ = KeyPair::from_pem(key_pem)
            .map_err(|e| PkiError::Parse(format!("failed to parse CA key: {e}")))?;
        let _ = parse_pem(cert_pem)?;

        Ok(Self {
            ca_key_pem: key_pem.to_string(),
            ca_cert_pem: cert_pem.to_string(),
        })
    }

    /// The CA certificate in PEM format.
    pub fn cert_pem(&self) -> &str {
        &self.ca_cert_pem
    }

    /// The CA private key in PEM format.
    pub fn key_pem(&self) -> &str {
        &self.ca_key_pem
    }

    /// Validity window of the CA certificate.
    pub fn info(&self) -> Result<CertificateInfo> {
        CertificateInfo::from_pem(&self.ca_cert_pem)
    }

    fn load_key_pair(&self) -> Result<KeyPair> {
        KeyPair::from_pem(&self.ca_key_pem)
            .map_err(|e| PkiError::Parse(format!("failed to load CA key: {e}")))
    }

    /// Sign a leaf certificate for component-to-component authentication.
    ///
    /// The certificate is valid for the given hostnames, usable for both
    /// server and client authentication, and bound to the service principal
    /// given by `common_name`, `serial_number`, and `organizations`.
    /// Returns `(cert_pem, key_pem)`.
    pub fn issue_leaf(
        &self,
        common_name: &str,
        serial_number: &str,
        organizations: &[String],
        hostnames: &[String],
    ) -> Result<(String, String)> {
        let mut params = CertificateParams::default();

        let mut dn = DistinguishedName::new();
        dn.push(
            DnType::CommonName,
            DnValue::Utf8String(common_name.to_string()),
        );
        if !serial_number.is_empty() {
            // serialNumber attribute (OID 2.5.4.5)
            dn.push(
                DnType::CustomDnType(vec![2, 5, 4, 5]),
                DnValue::Utf8String(serial_number.to_string()),
            );
        }
        for org in organizations {
            dn.push(DnType::OrganizationName, DnValue::Utf8String(org.clone()));
        }
        params.distinguished_name = dn;

        params.is_ca = IsCa::NoCa;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ];

        let (not_before, not_after) = compute_validity(LEAF_VALIDITY_DAYS);
        params.not_before = not_before;
        params.not_after = not_after;

        params.subject_alt_names = hostnames
            .iter()
            .map(|san| {
                if let Ok(ip) = san.parse::<std::net::IpAddr>() {
                    Ok(SanType::IpAddress(ip))
                } else {
                    Ia5String::try_from(san.clone())
                        .map(SanType::DnsName)
                        .map_err(|e| {
                            PkiError::CertificateGeneration(format!(
                                "invalid DNS name '{san}': {e}"
                            ))
                        })
                }
            })
            .collect::<Result<Vec<_>>>()?;

        let leaf_key = KeyPair::generate()
            .map_err(|e| PkiError::KeyGeneration(format!("failed to generate leaf key: {e}")))?;
        let leaf_key_pem = leaf_key.serialize_pem();

        let ca_key = self.load_key_pair()?;
        let issuer = Issuer::from_ca_cert_pem(&self.ca_cert_pem, &ca_key)
            .map_err(|e| PkiError::Parse(format!("failed to create issuer: {e}")))?;

        let leaf_cert = params.signed_by(&leaf_key, &issuer).map_err(|e| {
            PkiError::CertificateGeneration(format!("failed to sign leaf cert: {e}"))
        })?;

        Ok((leaf_cert.pem(), leaf_key_pem))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ca_round_trips() {
        let ca = CertificateAuthority::generate("tracestack-ca").unwrap();
        let info = ca.info().unwrap();
        assert_eq!(info.common_name, "tracestack-ca");
        assert_eq!(info.lifetime_secs(), CA_VALIDITY_DAYS * 24 * 60 * 60);

        let reloaded = CertificateAuthority::from_pem(ca.cert_pem(), ca.key_pem()).unwrap();
        assert_eq!(reloaded.cert_pem(), ca.cert_pem());
    }

    #[test]
    fn issued_leaf_carries_principal_subject() {
        let ca = CertificateAuthority::generate("tracestack-ca").unwrap();
        let (cert_pem, key_pem) = ca
            .issue_leaf(
                "system:tracestacks",
                "",
                &["system:observability".to_string()],
                &["demo-ingester".to_string()],
            )
            .unwrap();

        let info = CertificateInfo::from_pem(&cert_pem).unwrap();
        assert_eq!(info.common_name, "system:tracestacks");
        assert_eq!(info.lifetime_secs(), LEAF_VALIDITY_DAYS * 24 * 60 * 60);
        assert!(key_pem.contains("PRIVATE KEY"));
    }

    #[test]
    fn renewal_window_math() {
        let info = CertificateInfo {
            not_before: 0,
            not_after: 1000,
            common_name: String::new(),
        };
        assert!(!info.needs_renewal_at(500));
        assert!(!info.needs_renewal_at(799));
        assert!(info.needs_renewal_at(800));
        assert!(info.needs_renewal_at(1500));
        assert!(!info.is_expired_at(999));
        assert!(info.is_expired_at(1000));
    }

    #[test]
    fn degenerate_window_needs_renewal() {
        let info = CertificateInfo {
            not_before: 1000,
            not_after: 1000,
            common_name: String::new(),
        };
        assert!(info.needs_renewal_at(1000));
    }
}
