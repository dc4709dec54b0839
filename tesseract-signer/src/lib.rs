//! SCT signer (C7). Only ECDSA P-256 keys are supported -- RSA signing
//! keys are an explicit Non-goal, so a key of any other type is rejected
//! at construction time (a startup error) rather than discovered later as
//! a per-request failure.

use p256::{
    ecdsa::SigningKey,
    pkcs8::{DecodePrivateKey, EncodePublicKey},
};
use tesseract_core::{Entry, Sct, SctError, tiling::Checkpoint};
use thiserror::Error;

pub struct Signer {
    log_id: [u8; 32],
    signing_key: SigningKey,
}

impl Signer {
    /// Loads the signing key from a PKCS#8 PEM document. Fails if the key
    /// is not an ECDSA P-256 private key.
    pub fn from_pkcs8_pem(pem: &str) -> Result<Self, SignerError> {
        let signing_key =
            SigningKey::from_pkcs8_pem(pem).map_err(|_| SignerError::UnsupportedKeyType)?;

        let verifying_key = p256::ecdsa::VerifyingKey::from(&signing_key);
        let spki = verifying_key
            .to_public_key_der()
            .map_err(|_| SignerError::UnsupportedKeyType)?;

        Ok(Self {
            log_id: tesseract_core::log_id(spki.as_bytes()),
            signing_key,
        })
    }

    /// The log's id, `SHA256(SubjectPublicKeyInfo)`, as embedded in every
    /// SCT this signer issues.
    pub fn log_id(&self) -> [u8; 32] {
        self.log_id
    }

    pub fn sign(&self, timestamp: u64, entry: &Entry) -> Result<Sct, SignerError> {
        Sct::sign(self.log_id, timestamp, entry, &self.signing_key).map_err(SignerError::Signing)
    }

    /// Signs a checkpoint with the same key used for SCTs, under the
    /// given note name (the log's `origin`).
    pub fn sign_checkpoint(&self, checkpoint: &mut Checkpoint, origin: &str) {
        checkpoint.sign(origin, &self.signing_key);
    }
}

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("signing key is not a supported ECDSA P-256 private key")]
    UnsupportedKeyType,

    #[error("failed to sign the entry: {0}")]
    Signing(#[from] SctError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::pkcs8::EncodePrivateKey;
    use rand::rngs::OsRng;
    use tesseract_core::EntryType;

    fn sample_entry() -> Entry {
        Entry {
            entry_type: EntryType::X509,
            cert_der: vec![1, 2, 3],
            precertificate: vec![],
            issuer_key_hash: [0u8; 32],
            fingerprints_chain: vec![],
        }
    }

    #[test]
    fn loads_p256_key_and_signs() {
        let signing_key = SigningKey::random(&mut OsRng);
        let pem = signing_key
            .to_pkcs8_pem(Default::default())
            .unwrap()
            .to_string();

        let signer = Signer::from_pkcs8_pem(&pem).unwrap();
        let sct = signer.sign(1234, &sample_entry()).unwrap();
        assert_eq!(sct.id, signer.log_id());
    }

    #[test]
    fn rejects_non_pem_garbage() {
        assert!(matches!(
            Signer::from_pkcs8_pem("not a key"),
            Err(SignerError::UnsupportedKeyType)
        ));
    }
}
