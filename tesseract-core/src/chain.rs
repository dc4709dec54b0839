use crate::{
    Certificate, CertificateError,
    cert::{CT_POISON, SCT_V1},
    entry::{Entry, EntryType},
};
use sha2::{Digest, Sha256};
use thiserror::Error;
use x509_cert::{Certificate as Cert, der::Encode};
use x509_verify::VerifyingKey;

/// A chain of trust as presented by a submitter: `[leaf, intermediate, ...,
/// root]`. Unlike TLS, the chain handed to a CT log may also include a
/// "pre-issuer" (CT precertificate signing certificate) directly above the
/// leaf when the leaf is a precertificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateChain(Vec<Certificate>);

impl From<Vec<Certificate>> for CertificateChain {
    fn from(value: Vec<Certificate>) -> Self {
        Self(value)
    }
}

impl CertificateChain {
    pub fn from_pem_chain(input: &str) -> Result<Self, CertificateError> {
        let chain = Cert::load_pem_chain(input.as_bytes()).map_err(|_| {
            CertificateError::CodecError(crate::utils::codec::CodecError::InvalidPem)
        })?;

        if chain.len() < 2 {
            return Err(CertificateError::InvalidChain);
        }

        Ok(Self(chain.into_iter().map(Certificate).collect()))
    }

    /// Builds a chain from raw DER certificates, in submission order
    /// (`[leaf, intermediate, ..., root]`), as received in an
    /// `add-chain`/`add-pre-chain` JSON request body.
    pub fn from_der_list(der_certs: Vec<Vec<u8>>) -> Result<Self, CertificateError> {
        if der_certs.len() < 2 {
            return Err(CertificateError::InvalidChain);
        }

        der_certs
            .iter()
            .map(|der| Certificate::from_der(der))
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    pub fn as_slice(&self) -> &[Certificate] {
        &self.0
    }

    pub fn leaf(&self) -> &Certificate {
        &self.0[0]
    }

    pub fn root(&self) -> &Certificate {
        self.0.last().expect("chain always has at least 2 certs")
    }

    /// Verify every signature in the chain links, without reference to any
    /// trust store; callers (the chain validator) are responsible for
    /// checking that the terminal certificate is actually trusted.
    pub fn verify_links(&self) -> Result<(), CertificateError> {
        for idx in 1..self.0.len() {
            let key = VerifyingKey::try_from(&self.0[idx].0)?;
            key.verify(&self.0[idx - 1].0)?;
        }
        Ok(())
    }

    pub fn verify_against_root(&self, root: &Certificate) -> Result<(), CertificateError> {
        let key = VerifyingKey::try_from(&root.0)?;
        key.verify(&self.0.last().unwrap().0)?;
        Ok(())
    }

    /// `true` if the certificate directly above the leaf is itself a CT
    /// precertificate signing certificate (a "pre-issuer"): it carries the
    /// CT pre-issuer EKU and is itself a CA.
    pub fn has_preissuer(&self) -> bool {
        self.0.get(1).is_some_and(|cert| cert.is_precert_signing_cert() && cert.is_ca())
    }

    /// Build the canonical [`Entry`] the log will sequence for this chain.
    ///
    /// `issuers_without_leaf` is `self.as_slice()[1..]` and is what C3
    /// (the issuer store) is given to persist.
    ///
    /// If the leaf is a precertificate signed by a pre-issuer, the TBS is
    /// rewritten so that `Issuer` and the Authority Key Identifier point at
    /// the pre-issuer's own issuer (the real issuing CA), per
    /// `c2sp.org/static-ct-api`: precertificates must be logged as if they
    /// had been issued directly by the CA that issued the pre-issuer.
    pub fn build_entry(&self) -> Result<Entry, ChainError> {
        let is_precert = self.leaf().is_precert().map_err(ChainError::Certificate)?;

        if !is_precert {
            return Ok(Entry {
                entry_type: EntryType::X509,
                cert_der: self.leaf_der()?,
                precertificate: vec![],
                issuer_key_hash: [0u8; 32],
                fingerprints_chain: self.fingerprints_above_leaf()?,
            });
        }

        if self.has_preissuer() && self.0.len() < 3 {
            return Err(ChainError::MissingPreIssuerParent);
        }

        // The "real" issuer is the certificate that issued the pre-issuer
        // (if any), otherwise whoever issued the leaf directly.
        let issuer_idx = if self.has_preissuer() { 2 } else { 1 };
        let issuer = &self.0[issuer_idx];

        if self.has_preissuer() && !issuer.is_ca() {
            return Err(ChainError::PreIssuerParentNotCa);
        }

        let issuer_spki_der = issuer
            .subject_public_key_info_der()
            .map_err(ChainError::Certificate)?;
        let issuer_key_hash: [u8; 32] = Sha256::digest(&issuer_spki_der).into();

        let mut tbs = self.leaf().inner().tbs_certificate.clone();

        if self.has_preissuer() {
            tbs.issuer = issuer.inner().tbs_certificate.subject.clone();
        }

        tbs.extensions = tbs.extensions.map(|extensions| {
            extensions
                .into_iter()
                .filter(|extension| extension.extn_id != SCT_V1 && extension.extn_id != CT_POISON)
                .collect::<Vec<_>>()
        });

        if self.has_preissuer() {
            rewrite_authority_key_id(&mut tbs, issuer);
        }

        let mut tbs_der = vec![];
        tbs.encode_to_vec(&mut tbs_der)
            .map_err(|err| ChainError::Certificate(crate::utils::codec::CodecError::DerError(err).into()))?;

        Ok(Entry {
            entry_type: EntryType::Precert,
            cert_der: tbs_der,
            precertificate: self.leaf_der()?,
            issuer_key_hash,
            fingerprints_chain: self.fingerprints_above_leaf()?,
        })
    }

    fn leaf_der(&self) -> Result<Vec<u8>, ChainError> {
        let mut out = vec![];
        self.leaf()
            .inner()
            .encode_to_vec(&mut out)
            .map_err(|err| ChainError::Certificate(crate::utils::codec::CodecError::DerError(err).into()))?;
        Ok(out)
    }

    /// SHA-256 of every certificate above the leaf, excluding any CT
    /// pre-issuer (which is not part of the real issuing chain).
    fn fingerprints_above_leaf(&self) -> Result<Vec<[u8; 32]>, ChainError> {
        let skip = if self.has_preissuer() { 2 } else { 1 };
        self.0[skip..]
            .iter()
            .map(|cert| {
                let der = cert.to_der().map_err(ChainError::Certificate)?;
                Ok(Sha256::digest(&der).into())
            })
            .collect()
    }
}

/// Rewrite the AKI of a defanged precert TBS to point at `new_issuer`'s
/// subject key identifier, falling back to leaving it untouched if either
/// certificate lacks a recognizable SKI/AKI extension (non-conformant CAs
/// exist; the validator, not the entry builder, decides whether to reject).
fn rewrite_authority_key_id(
    tbs: &mut x509_cert::TbsCertificate,
    new_issuer: &Certificate,
) {
    use crate::cert::AUTH_KEY_ID;
    use x509_cert::{
        der::{Decode, Encode, asn1::OctetString},
        ext::pkix::AuthorityKeyIdentifier,
    };

    let Some(new_ski) = new_issuer.get_subject_key_info() else {
        return;
    };

    let Some(extensions) = tbs.extensions.as_mut() else {
        return;
    };

    for extension in extensions.iter_mut() {
        if extension.extn_id != AUTH_KEY_ID {
            continue;
        }

        let Ok(mut aki) = AuthorityKeyIdentifier::from_der(extension.extn_value.as_bytes()) else {
            continue;
        };

        aki.key_identifier = Some(OctetString::new(new_ski.clone()).expect("SKI fits in an OctetString"));

        let mut encoded = vec![];
        if aki.encode_to_vec(&mut encoded).is_ok() {
            if let Ok(value) = OctetString::new(encoded) {
                extension.extn_value = value;
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("failed to inspect certificate: {0}")]
    Certificate(#[from] CertificateError),

    #[error("the leaf is a precertificate signed by a pre-issuer, but the chain has no issuer above it")]
    MissingPreIssuerParent,

    #[error("the pre-issuer's parent certificate is not itself a CA")]
    PreIssuerParentNotCa,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{
        INTERMEDIATE_PEM, ISSUER_NOT_CA_PEM, PRECERT_DIRECT_PEM, PRECERT_WITH_PREISSUER_PEM,
        PRE_ISSUER_NOT_CA_PEM, PRE_ISSUER_PEM,
    };

    fn chain_of(pems: &[&str]) -> CertificateChain {
        let certs = pems
            .iter()
            .map(|pem| Certificate::from_pem(pem).unwrap())
            .collect();
        CertificateChain(certs)
    }

    #[test]
    fn precert_direct_has_no_preissuer() {
        let chain = chain_of(&[PRECERT_DIRECT_PEM, INTERMEDIATE_PEM]);
        assert!(!chain.has_preissuer());

        let entry = chain.build_entry().unwrap();
        assert_eq!(entry.entry_type, EntryType::Precert);
    }

    #[test]
    fn precert_with_preissuer_is_detected_and_rewritten() {
        let chain = chain_of(&[PRECERT_WITH_PREISSUER_PEM, PRE_ISSUER_PEM, INTERMEDIATE_PEM]);
        assert!(chain.has_preissuer());

        let entry = chain.build_entry().unwrap();
        assert_eq!(entry.entry_type, EntryType::Precert);

        let intermediate = Certificate::from_pem(INTERMEDIATE_PEM).unwrap();
        let issuer_spki = intermediate.subject_public_key_info_der().unwrap();
        let expected_hash: [u8; 32] = Sha256::digest(&issuer_spki).into();
        assert_eq!(entry.issuer_key_hash, expected_hash);
    }

    #[test]
    fn preissuer_eku_without_is_ca_is_not_treated_as_preissuer() {
        let chain = chain_of(&[PRECERT_WITH_PREISSUER_PEM, PRE_ISSUER_NOT_CA_PEM, INTERMEDIATE_PEM]);
        assert!(!chain.has_preissuer());
    }

    #[test]
    fn preissuer_parent_that_is_not_a_ca_is_rejected() {
        let chain = chain_of(&[PRECERT_WITH_PREISSUER_PEM, PRE_ISSUER_PEM, ISSUER_NOT_CA_PEM]);
        assert!(chain.has_preissuer());
        assert_eq!(chain.build_entry(), Err(ChainError::PreIssuerParentNotCa));
    }

    #[test]
    fn build_entry_is_deterministic() {
        let chain = chain_of(&[PRECERT_WITH_PREISSUER_PEM, PRE_ISSUER_PEM, INTERMEDIATE_PEM]);
        let e1 = chain.build_entry().unwrap();
        let e2 = chain.build_entry().unwrap();
        assert_eq!(e1, e2);
    }
}
