//! Chain validator (C1): takes a submitted certificate chain, checks the
//! signature links against a configured trust store, and applies the
//! policy checks (validity window, extended key usage allow-list,
//! rejected-extension block-list, poison-extension shape) that decide
//! whether a chain is eligible to be logged.

use std::collections::HashSet;

use p256::pkcs8::ObjectIdentifier;
use tesseract_core::{Certificate, CertificateChain, CertificateError, CheckSeverity, Severity};
use thiserror::Error;

/// Policy configuration for the validator, built once at startup.
///
/// EKU/extension allow- and block-lists are stored as [`HashSet`]s so the
/// hot path (every submitted chain) does a constant-time lookup instead of
/// scanning a `Vec` per certificate.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    pub reject_expired: bool,
    pub reject_unexpired: bool,
    pub allowed_ekus: Option<HashSet<ObjectIdentifier>>,
    pub rejected_extensions: HashSet<ObjectIdentifier>,
    pub not_after_start: Option<i64>,
    pub not_after_limit: Option<i64>,
}

impl ValidatorConfig {
    /// Builds the config, rejecting combinations that can never accept a
    /// chain (and would otherwise silently reject every submission).
    pub fn new(
        reject_expired: bool,
        reject_unexpired: bool,
        allowed_ekus: Option<Vec<ObjectIdentifier>>,
        rejected_extensions: Vec<ObjectIdentifier>,
        not_after_start: Option<i64>,
        not_after_limit: Option<i64>,
    ) -> Result<Self, ConfigError> {
        if reject_expired && reject_unexpired {
            return Err(ConfigError::NoValidCertificatesAllowed);
        }

        if let (Some(start), Some(limit)) = (not_after_start, not_after_limit) {
            if limit < start {
                return Err(ConfigError::EmptyNotAfterWindow { start, limit });
            }
        }

        Ok(Self {
            reject_expired,
            reject_unexpired,
            allowed_ekus: allowed_ekus.map(|ekus| ekus.into_iter().collect()),
            rejected_extensions: rejected_extensions.into_iter().collect(),
            not_after_start,
            not_after_limit,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("reject_expired and reject_unexpired together reject every certificate")]
    NoValidCertificatesAllowed,

    #[error("not_after_limit ({limit}) is before not_after_start ({start}), the window is empty")]
    EmptyNotAfterWindow { start: i64, limit: i64 },
}

/// A trust store of root certificates the validator chains against.
///
/// Roots are looked up by subject key identifier when available, falling
/// back to a linear signature-verification scan -- most deployments carry a
/// few hundred roots at most, so this is not a hot-path concern.
#[derive(Debug, Clone, Default)]
pub struct TrustStore {
    roots: Vec<Certificate>,
}

impl TrustStore {
    pub fn from_pem_bundle(pem: &str) -> Result<Self, CertificateError> {
        use x509_cert::der::Encode;

        let roots = x509_cert::Certificate::load_pem_chain(pem.as_bytes())
            .map_err(|_| CertificateError::InvalidChain)?
            .into_iter()
            .map(|cert| {
                let mut der = vec![];
                cert.encode_to_vec(&mut der)
                    .map_err(|err| CertificateError::CodecError(err.into()))?;
                Certificate::from_der(&der)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { roots })
    }

    pub fn roots(&self) -> &[Certificate] {
        &self.roots
    }
}

pub struct Validator {
    config: ValidatorConfig,
    trust_store: TrustStore,
}

impl Validator {
    pub fn new(config: ValidatorConfig, trust_store: TrustStore) -> Self {
        Self {
            config,
            trust_store,
        }
    }

    /// Validates a submitted chain against the trust store and policy.
    ///
    /// `is_precert` is the classification declared by the endpoint the
    /// chain was submitted to (`add-chain` vs `add-pre-chain`); the leaf's
    /// actual poison shape must agree with it.
    pub fn validate(&self, chain: &CertificateChain, is_precert: bool) -> Result<(), ValidationError> {
        tracing::debug!(chain_len = chain.as_slice().len(), is_precert, "validating submitted chain");

        chain.verify_links().map_err(ValidationError::Certificate)?;

        let anchored = self
            .trust_store
            .roots()
            .iter()
            .any(|root| chain.verify_against_root(root).is_ok());
        if !anchored {
            return Err(ValidationError::UntrustedRoot);
        }

        self.check_poison_shape(chain, is_precert)?;
        self.check_validity_window(chain.leaf())?;
        self.check_ekus(chain.leaf())?;
        self.check_rejected_extensions(chain.leaf())?;

        Ok(())
    }

    fn check_poison_shape(&self, chain: &CertificateChain, is_precert: bool) -> Result<(), ValidationError> {
        // `is_precert` on the certificate itself already rejects a leaf
        // with more than one poison extension, or a poison alongside an
        // embedded SCT; surface that as policy rejection rather than a
        // bare certificate error. Separately, the shape found on the wire
        // must agree with which endpoint the chain was submitted to.
        let actual = chain
            .leaf()
            .is_precert()
            .map_err(|_| ValidationError::MalformedPoison)?;

        if actual != is_precert {
            return Err(ValidationError::PoisonMismatch);
        }

        Ok(())
    }

    fn check_validity_window(&self, leaf: &Certificate) -> Result<(), ValidationError> {
        let now = now_unix();

        if self.config.reject_expired && leaf.not_after_unix() < now {
            return Err(ValidationError::Expired);
        }
        if self.config.reject_unexpired && leaf.not_after_unix() >= now {
            return Err(ValidationError::NotYetExpired);
        }

        if let Some(start) = self.config.not_after_start {
            if leaf.not_after_unix() < start {
                return Err(ValidationError::OutsideNotAfterWindow);
            }
        }
        if let Some(limit) = self.config.not_after_limit {
            if leaf.not_after_unix() >= limit {
                return Err(ValidationError::OutsideNotAfterWindow);
            }
        }

        Ok(())
    }

    fn check_ekus(&self, leaf: &Certificate) -> Result<(), ValidationError> {
        let Some(allowed) = &self.config.allowed_ekus else {
            return Ok(());
        };

        let Some(ekus) = leaf.extended_key_usages() else {
            // No EKU extension at all: nothing to reject against an
            // allow-list, the CA's issuance policy governs this instead.
            return Ok(());
        };

        if ekus.iter().all(|eku| !allowed.contains(eku)) {
            return Err(ValidationError::DisallowedEku);
        }

        Ok(())
    }

    fn check_rejected_extensions(&self, leaf: &Certificate) -> Result<(), ValidationError> {
        if self.config.rejected_extensions.is_empty() {
            return Ok(());
        }

        if leaf
            .extension_oids()
            .iter()
            .any(|oid| self.config.rejected_extensions.contains(oid))
        {
            return Err(ValidationError::RejectedExtension);
        }

        Ok(())
    }
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock is after 1970")
        .as_secs() as i64
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("chain signature verification failed: {0}")]
    Certificate(CertificateError),

    #[error("chain does not anchor to a trusted root")]
    UntrustedRoot,

    #[error("leaf has a malformed poison extension")]
    MalformedPoison,

    #[error("leaf's poison extension does not match the endpoint it was submitted to")]
    PoisonMismatch,

    #[error("leaf certificate has expired")]
    Expired,

    #[error("leaf certificate has not yet expired")]
    NotYetExpired,

    #[error("leaf NotAfter falls outside the configured window")]
    OutsideNotAfterWindow,

    #[error("leaf does not carry an allowed extended key usage")]
    DisallowedEku,

    #[error("leaf carries a rejected extension")]
    RejectedExtension,
}

impl CheckSeverity for ValidationError {
    fn severity(&self) -> Severity {
        match self {
            ValidationError::Certificate(err) => err.severity(),
            ValidationError::UntrustedRoot => Severity::Unsafe,
            ValidationError::MalformedPoison => Severity::Unsafe,
            ValidationError::PoisonMismatch => Severity::Unsafe,
            ValidationError::Expired => Severity::Unsafe,
            ValidationError::NotYetExpired => Severity::Unsafe,
            ValidationError::OutsideNotAfterWindow => Severity::Unsafe,
            ValidationError::DisallowedEku => Severity::Unsafe,
            ValidationError::RejectedExtension => Severity::Unsafe,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT_PEM: &str = include_str!("../../testdata/root.pem");
    const INTERMEDIATE_PEM: &str = include_str!("../../testdata/intermediate.pem");
    const LEAF_PEM: &str = include_str!("../../testdata/leaf.pem");
    const LEAF_EXPIRED_PEM: &str = include_str!("../../testdata/leaf_expired.pem");
    const PRECERT_DIRECT_PEM: &str = include_str!("../../testdata/precert_direct.pem");

    fn chain_of(pems: &[&str]) -> CertificateChain {
        pems.iter()
            .map(|pem| Certificate::from_pem(pem).unwrap())
            .collect::<Vec<_>>()
            .into()
    }

    fn default_config() -> ValidatorConfig {
        ValidatorConfig::new(false, false, None, vec![], None, None).unwrap()
    }

    #[test]
    fn config_rejects_reject_expired_and_unexpired_together() {
        assert_eq!(
            ValidatorConfig::new(true, true, None, vec![], None, None),
            Err(ConfigError::NoValidCertificatesAllowed)
        );
    }

    #[test]
    fn config_rejects_empty_not_after_window() {
        assert_eq!(
            ValidatorConfig::new(false, false, None, vec![], Some(100), Some(50)),
            Err(ConfigError::EmptyNotAfterWindow { start: 100, limit: 50 })
        );
    }

    #[test]
    fn valid_chain_anchored_to_trust_store_is_accepted() {
        let trust_store = TrustStore::from_pem_bundle(ROOT_PEM).unwrap();
        let validator = Validator::new(default_config(), trust_store);
        let chain = chain_of(&[LEAF_PEM, INTERMEDIATE_PEM]);
        validator.validate(&chain, false).unwrap();
    }

    #[test]
    fn chain_not_anchored_to_trust_store_is_rejected() {
        let validator = Validator::new(default_config(), TrustStore::default());
        let chain = chain_of(&[LEAF_PEM, INTERMEDIATE_PEM]);
        assert_eq!(validator.validate(&chain, false), Err(ValidationError::UntrustedRoot));
    }

    #[test]
    fn reject_expired_rejects_expired_leaf() {
        let trust_store = TrustStore::from_pem_bundle(ROOT_PEM).unwrap();
        let config = ValidatorConfig::new(true, false, None, vec![], None, None).unwrap();
        let validator = Validator::new(config, trust_store);
        let chain = chain_of(&[LEAF_EXPIRED_PEM, INTERMEDIATE_PEM]);
        assert_eq!(validator.validate(&chain, false), Err(ValidationError::Expired));
    }

    #[test]
    fn plain_cert_submitted_as_precert_is_rejected() {
        let trust_store = TrustStore::from_pem_bundle(ROOT_PEM).unwrap();
        let validator = Validator::new(default_config(), trust_store);
        let chain = chain_of(&[LEAF_PEM, INTERMEDIATE_PEM]);
        assert_eq!(validator.validate(&chain, true), Err(ValidationError::PoisonMismatch));
    }

    #[test]
    fn precert_submitted_as_plain_cert_is_rejected() {
        let trust_store = TrustStore::from_pem_bundle(ROOT_PEM).unwrap();
        let validator = Validator::new(default_config(), trust_store);
        let chain = chain_of(&[PRECERT_DIRECT_PEM, INTERMEDIATE_PEM]);
        assert_eq!(validator.validate(&chain, false), Err(ValidationError::PoisonMismatch));
    }
}
