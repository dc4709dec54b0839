use crate::{
    CheckSeverity, Severity,
    utils::{codec::CodecError, hex_with_colons},
};
use p256::pkcs8::ObjectIdentifier;
use sha2::{Digest, Sha256};
use std::fmt::{self, Display};
use thiserror::Error;
use x509_cert::{
    Certificate as Cert,
    der::{Decode as CertDecode, DecodePem, Encode as CertEncode},
    ext::pkix::{
        AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, SubjectKeyIdentifier,
    },
};

/// SCT extension embedded into issued leaf certificates (RFC 6962 3.3).
pub(crate) const SCT_V1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.4.1.11129.2.4.2");
/// Critical poison extension marking a precertificate (RFC 6962 3.1).
pub(crate) const CT_POISON: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.11129.2.4.3");
/// EKU present on CT precertificate signing certificates (pre-issuers).
pub(crate) const CT_PREISSUER_EKU: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.11129.2.4.4");

pub(crate) const SUBJECT_KEY_ID: ObjectIdentifier =
    const_oid::db::rfc5280::ID_CE_SUBJECT_KEY_IDENTIFIER;
pub(crate) const AUTH_KEY_ID: ObjectIdentifier =
    const_oid::db::rfc5280::ID_CE_AUTHORITY_KEY_IDENTIFIER;
const BASIC_CONSTRAINTS: ObjectIdentifier = const_oid::db::rfc5280::ID_CE_BASIC_CONSTRAINTS;
const EXT_KEY_USAGE: ObjectIdentifier = const_oid::db::rfc5280::ID_CE_EXT_KEY_USAGE;

/// A parsed X.509 certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate(pub(crate) Cert);

impl Certificate {
    /// Parse a single PEM-encoded certificate.
    pub fn from_pem(input: &str) -> Result<Self, CertificateError> {
        Ok(Self(
            Cert::from_pem(input.as_bytes()).map_err(CodecError::DerError)?,
        ))
    }

    /// Parse a single DER-encoded certificate.
    pub fn from_der(input: &[u8]) -> Result<Self, CertificateError> {
        Ok(Self(Cert::from_der(input).map_err(CodecError::DerError)?))
    }

    /// `true` if this certificate carries the critical CT poison extension
    /// and no embedded SCT extension; an error if both are present, which
    /// is itself malformed input.
    pub fn is_precert(&self) -> Result<bool, CertificateError> {
        let Some(extensions) = &self.0.tbs_certificate.extensions else {
            return Ok(false);
        };

        let scts = extensions
            .iter()
            .filter(|extension| extension.extn_id == SCT_V1)
            .count();

        let poisons = extensions
            .iter()
            .filter(|extension| extension.extn_id == CT_POISON && extension.critical)
            .filter(|extension| extension.extn_value.as_bytes() == [0x05, 0x00])
            .count();

        match (poisons, scts) {
            (1, 0) => Ok(true),
            (0, _) => Ok(false),
            _ => Err(CertificateError::InvalidPreCert),
        }
    }

    pub fn fingerprint_sha256(&self) -> Fingerprint {
        let hash: [u8; 32] = Sha256::digest(self.to_der().expect("a parsed certificate always re-encodes")).into();
        Fingerprint(hash)
    }

    /// Re-encodes this certificate to DER.
    pub fn to_der(&self) -> Result<Vec<u8>, CertificateError> {
        let mut out = vec![];
        self.0.encode_to_vec(&mut out).map_err(CodecError::DerError)?;
        Ok(out)
    }

    pub fn get_subject_key_info(&self) -> Option<Vec<u8>> {
        let extensions = self.0.tbs_certificate.extensions.as_ref()?;

        extensions
            .iter()
            .find(|extension| extension.extn_id == SUBJECT_KEY_ID)
            .and_then(|extension| {
                SubjectKeyIdentifier::from_der(extension.extn_value.as_bytes()).ok()
            })
            .map(|key_id| key_id.0.as_bytes().to_vec())
    }

    pub fn get_authority_key_info(&self) -> Option<Vec<u8>> {
        let extensions = self.0.tbs_certificate.extensions.as_ref()?;

        extensions
            .iter()
            .find(|extension| extension.extn_id == AUTH_KEY_ID)
            .and_then(|extension| {
                AuthorityKeyIdentifier::from_der(extension.extn_value.as_bytes()).ok()
            })
            .and_then(|key_id| key_id.key_identifier)
            .map(|key_id| key_id.as_bytes().to_vec())
    }

    pub fn is_ca(&self) -> bool {
        let Some(extensions) = &self.0.tbs_certificate.extensions else {
            return false;
        };

        extensions
            .iter()
            .find(|extension| extension.extn_id == BASIC_CONSTRAINTS)
            .and_then(|extension| BasicConstraints::from_der(extension.extn_value.as_bytes()).ok())
            .map(|bc| bc.ca)
            .unwrap_or(false)
    }

    /// `true` if this certificate carries the CT precertificate-signing EKU
    /// (`1.3.6.1.4.1.11129.2.4.4`) -- i.e. it is a "pre-issuer".
    pub fn is_precert_signing_cert(&self) -> bool {
        self.extended_key_usages()
            .is_some_and(|ekus| ekus.contains(&CT_PREISSUER_EKU))
    }

    /// OIDs of every extension on the certificate, in encoding order.
    pub fn extension_oids(&self) -> Vec<ObjectIdentifier> {
        self.0
            .tbs_certificate
            .extensions
            .as_ref()
            .map(|extensions| extensions.iter().map(|extension| extension.extn_id).collect())
            .unwrap_or_default()
    }

    pub fn extended_key_usages(&self) -> Option<Vec<ObjectIdentifier>> {
        let extensions = self.0.tbs_certificate.extensions.as_ref()?;

        extensions
            .iter()
            .find(|extension| extension.extn_id == EXT_KEY_USAGE)
            .and_then(|extension| ExtendedKeyUsage::from_der(extension.extn_value.as_bytes()).ok())
            .map(|eku| eku.0)
    }

    /// Seconds since the Unix epoch at which this certificate becomes valid.
    pub fn not_before_unix(&self) -> i64 {
        unix_seconds(&self.0.tbs_certificate.validity.not_before)
    }

    /// Seconds since the Unix epoch at which this certificate expires.
    pub fn not_after_unix(&self) -> i64 {
        unix_seconds(&self.0.tbs_certificate.validity.not_after)
    }

    /// DER encoding of the `SubjectPublicKeyInfo`.
    pub fn subject_public_key_info_der(&self) -> Result<Vec<u8>, CertificateError> {
        let mut out = vec![];
        self.0
            .tbs_certificate
            .subject_public_key_info
            .encode_to_vec(&mut out)
            .map_err(CodecError::DerError)?;
        Ok(out)
    }

    pub(crate) fn inner(&self) -> &Cert {
        &self.0
    }
}

fn unix_seconds(time: &x509_cert::time::Time) -> i64 {
    time.to_date_time().unix_duration().as_secs() as i64
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Fingerprint(pub [u8; 32]);

impl Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex_with_colons(&self.0))
    }
}

/// Error returned when parsing or inspecting a [`Certificate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CertificateError {
    #[error("a precert can't have SCTs or more than one poison value")]
    InvalidPreCert,

    #[error("the certificate chain is malformed")]
    InvalidChain,

    #[error("failed to decode a value: {0}")]
    CodecError(#[from] CodecError),

    #[error("failed to verify certificate: {0}")]
    VerificationError(x509_verify::Error),
}

impl CheckSeverity for CertificateError {
    fn severity(&self) -> Severity {
        match self {
            CertificateError::InvalidPreCert => Severity::Unsafe,
            CertificateError::InvalidChain => Severity::Unsafe,
            CertificateError::CodecError(codec_error) => codec_error.severity(),
            CertificateError::VerificationError(_) => Severity::Unsafe,
        }
    }
}

impl From<x509_verify::Error> for CertificateError {
    fn from(value: x509_verify::Error) -> Self {
        Self::VerificationError(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{LEAF_PEM, PRECERT_DIRECT_PEM};

    #[test]
    fn precert_detection() {
        let leaf = Certificate::from_pem(LEAF_PEM).unwrap();
        assert!(!leaf.is_precert().unwrap());

        let precert = Certificate::from_pem(PRECERT_DIRECT_PEM).unwrap();
        assert!(precert.is_precert().unwrap());
    }

    #[test]
    fn fingerprint_is_stable() {
        let leaf = Certificate::from_pem(LEAF_PEM).unwrap();
        let fp1 = leaf.fingerprint_sha256();
        let fp2 = leaf.fingerprint_sha256();
        assert_eq!(fp1, fp2);
    }

    #[test]
    fn preissuer_eku_detection() {
        let preissuer = Certificate::from_pem(crate::tests::PRE_ISSUER_PEM).unwrap();
        assert!(preissuer.is_precert_signing_cert());

        let leaf = Certificate::from_pem(LEAF_PEM).unwrap();
        assert!(!leaf.is_precert_signing_cert());
    }
}
