use crate::tree::{HashOutput, TreeHead};
use crate::utils::signature::SignatureValidationError;
use base64::{Engine, prelude::BASE64_STANDARD};
use p256::{
    ecdsa::{SigningKey, VerifyingKey, signature::Signer as _, signature::Verifier as _},
    elliptic_curve::sec1::ToEncodedPoint,
};
use sha2::{Digest, Sha256};
use signed_note::{Note, NoteError, Signature};
use thiserror::Error;

/// A static-CT-API tree checkpoint: a signed note whose first three lines
/// are `origin`, `tree_size` and the base64-encoded root hash.
///
/// See c2sp.org/checkpoint and c2sp.org/static-ct-api.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub origin: String,
    pub tree_size: u64,
    pub root_hash: HashOutput,
    pub signatures: Vec<Signature>,
}

impl From<Checkpoint> for TreeHead {
    fn from(checkpoint: Checkpoint) -> Self {
        TreeHead {
            tree_size: checkpoint.tree_size,
            head: checkpoint.root_hash,
        }
    }
}

impl Checkpoint {
    pub fn new(origin: String, tree_head: TreeHead) -> Self {
        Self {
            origin,
            tree_size: tree_head.tree_size,
            root_hash: tree_head.head,
            signatures: vec![],
        }
    }

    /// The unsigned checkpoint body, as it is fed to the signer and
    /// reproduced verbatim by a verifier.
    pub fn body(&self) -> String {
        format!(
            "{}\n{}\n{}\n",
            self.origin,
            self.tree_size,
            BASE64_STANDARD.encode(self.root_hash)
        )
    }

    pub fn parse_checkpoint(data: &str) -> Result<Self, ParseCheckpointError> {
        let note: Note = data
            .parse()
            .map_err(|_: NoteError| ParseCheckpointError::MalformedNote)?;

        let mut lines = note.text.lines();

        let origin = lines
            .next()
            .ok_or(ParseCheckpointError::MissingField { field_name: "origin" })?
            .to_string();

        let tree_size = lines
            .next()
            .ok_or(ParseCheckpointError::MissingField {
                field_name: "tree_size",
            })?
            .parse::<u64>()
            .map_err(|_| ParseCheckpointError::MalformedField {
                field_name: "tree_size",
            })?;

        let root_hash = lines.next().ok_or(ParseCheckpointError::MissingField {
            field_name: "root_hash",
        })?;
        let root_hash = BASE64_STANDARD.decode(root_hash).map_err(|_| {
            ParseCheckpointError::MalformedField {
                field_name: "root_hash",
            }
        })?;
        let root_hash: HashOutput =
            root_hash
                .try_into()
                .map_err(|_| ParseCheckpointError::MalformedField {
                    field_name: "root_hash",
                })?;

        Ok(Self {
            origin,
            tree_size,
            root_hash,
            signatures: note.sigs,
        })
    }

    pub fn as_string(&self) -> String {
        let mut out = self.body();
        out.push('\n');
        for sig in &self.signatures {
            out.push_str(&format!(
                "\u{2014} {} {}\n",
                sig.name,
                BASE64_STANDARD.encode(key_hash_and_signature(sig.hash, &sig.signature))
            ));
        }
        out
    }

    /// Signs the checkpoint body with `name`/`key`, appending the resulting
    /// signature line.
    pub fn sign(&mut self, name: &str, key: &SigningKey) {
        let hash = note_key_hash(name, &VerifyingKey::from(key));
        let signature: p256::ecdsa::Signature = key.sign(self.body().as_bytes());

        self.signatures.push(Signature {
            name: name.to_string(),
            hash,
            signature: signature.to_der().as_bytes().to_vec(),
        });
    }

    /// Verifies that at least one signature on this checkpoint was
    /// produced by `name`/`key`.
    pub fn verify(&self, name: &str, key: &VerifyingKey) -> Result<(), SignatureValidationError> {
        let expected_hash = note_key_hash(name, key);
        let body = self.body();

        let valid = self.signatures.iter().any(|sig| {
            sig.name == name
                && sig.hash == expected_hash
                && p256::ecdsa::Signature::from_der(&sig.signature)
                    .map(|parsed| key.verify(body.as_bytes(), &parsed).is_ok())
                    .unwrap_or(false)
        });

        if valid {
            Ok(())
        } else {
            Err(SignatureValidationError::InvalidSignature)
        }
    }
}

/// Algorithm tag 0x02 ("NIST P-256, SHA-256") defined by the signed-note
/// ECDSA extension used for static-CT-API checkpoints.
const ALGO_ECDSA_P256_SHA256: u8 = 0x02;

fn note_key_hash(name: &str, key: &VerifyingKey) -> u32 {
    let spki = key
        .to_encoded_point(false)
        .as_bytes()
        .to_vec();

    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update(b"\n");
    hasher.update([ALGO_ECDSA_P256_SHA256]);
    hasher.update(&spki);
    let digest = hasher.finalize();

    u32::from_be_bytes(digest[0..4].try_into().unwrap())
}

fn key_hash_and_signature(hash: u32, signature: &[u8]) -> Vec<u8> {
    let mut out = hash.to_be_bytes().to_vec();
    out.extend_from_slice(signature);
    out
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseCheckpointError {
    #[error("the note could not be parsed")]
    MalformedNote,

    #[error("no {field_name} contained in the note")]
    MissingField { field_name: &'static str },

    #[error("{field_name} could not be parsed")]
    MalformedField { field_name: &'static str },
}

impl crate::CheckSeverity for ParseCheckpointError {
    fn severity(&self) -> crate::Severity {
        crate::Severity::Unsafe
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn body_has_three_lines() {
        let head = TreeHead {
            tree_size: 7,
            head: [9u8; 32],
        };
        let checkpoint = Checkpoint::new("example.com/log".to_string(), head);
        assert_eq!(checkpoint.body().lines().count(), 3);
        assert!(checkpoint.body().starts_with("example.com/log\n7\n"));
    }

    #[test]
    fn sign_then_verify_roundtrips() {
        let head = TreeHead {
            tree_size: 42,
            head: [3u8; 32],
        };
        let mut checkpoint = Checkpoint::new("example.com/log".to_string(), head);

        let signing_key = SigningKey::random(&mut OsRng);
        checkpoint.sign("example.com/log", &signing_key);

        let verifying_key = VerifyingKey::from(&signing_key);
        checkpoint.verify("example.com/log", &verifying_key).unwrap();
    }

    #[test]
    fn verify_rejects_wrong_key() {
        let head = TreeHead {
            tree_size: 42,
            head: [3u8; 32],
        };
        let mut checkpoint = Checkpoint::new("example.com/log".to_string(), head);

        let signing_key = SigningKey::random(&mut OsRng);
        checkpoint.sign("example.com/log", &signing_key);

        let other_key = SigningKey::random(&mut OsRng);
        let other_verifying_key = VerifyingKey::from(&other_key);
        assert!(
            checkpoint
                .verify("example.com/log", &other_verifying_key)
                .is_err()
        );
    }
}
