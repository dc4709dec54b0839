use crate::{
    Entry, Version,
    store::Hashable,
    tree::HashOutput,
    utils::{
        base64::Base64,
        codec::{Codec, CodecError, Decode, Encode},
        codec_vec::CodecVec,
        signature::{Signature, SignatureValidationError},
    },
};
use p256::ecdsa::SigningKey;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use sha2::{Digest, Sha256};
use std::io::{Cursor, Read, Write};
use thiserror::Error;

/// See RFC 5246 3.2. Only `CertificateTimestamp` is produced by this log;
/// `TreeHash` is reserved for checkpoint/STH signing.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum SignatureType {
    CertificateTimestamp,
    TreeHash,
}

impl Encode for SignatureType {
    fn encode(&self, mut writer: impl Write) -> Result<(), CodecError> {
        let discriminant = match self {
            SignatureType::CertificateTimestamp => 0,
            SignatureType::TreeHash => 1,
        };
        Ok(writer.write_all(&[discriminant])?)
    }
}

impl Decode for SignatureType {
    fn decode(mut reader: impl Read) -> Result<Self, CodecError> {
        let mut buf = vec![0u8];
        reader.read_exact(&mut buf)?;

        match buf[0] {
            0 => Ok(SignatureType::CertificateTimestamp),
            1 => Ok(SignatureType::TreeHash),
            x => Err(CodecError::UnknownVariant("SignatureType", x as u64)),
        }
    }
}

/// A Signed Certificate Timestamp, as handed back from `add-chain`/
/// `add-pre-chain` and later embedded in the issued certificate (or an
/// x509 extension of the precertificate, for logs that support it).
///
/// See RFC 6962 3.2 and c2sp.org/static-ct-api.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sct {
    pub id: [u8; 32],
    pub timestamp: u64,
    pub extensions: Vec<u8>,
    pub signature: Signature<SctSigningInput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SctError {
    #[error("error signing or validating the SCT: {0}")]
    Signature(#[from] SignatureValidationError),

    #[error("error encoding the SCT: {0}")]
    Codec(#[from] CodecError),
}

impl crate::CheckSeverity for SctError {
    fn severity(&self) -> crate::Severity {
        crate::Severity::Unsafe
    }
}

impl Sct {
    /// Signs `entry`/`timestamp` with `log_id`'s private key, producing the
    /// SCT that will be returned to the submitter.
    pub fn sign(
        log_id: [u8; 32],
        timestamp: u64,
        entry: &Entry,
        key: &SigningKey,
    ) -> Result<Self, SctError> {
        let signing_input = SctSigningInput {
            sct_version: Version::V1,
            timestamp,
            entry: entry.clone(),
            extensions: CodecVec::empty(),
        };

        let signature = Signature::sign_ecdsa_p256(&signing_input, key)?;

        Ok(Self {
            id: log_id,
            timestamp,
            extensions: vec![],
            signature,
        })
    }

    pub fn validate(&self, entry: &Entry, spki_der: &[u8]) -> Result<(), SignatureValidationError> {
        let signing_input = SctSigningInput {
            sct_version: Version::V1,
            timestamp: self.timestamp,
            entry: entry.clone(),
            extensions: self.extensions.clone().into(),
        };

        self.signature.validate(&signing_input, spki_der)
    }
}

impl Encode for Sct {
    fn encode(&self, mut writer: impl Write) -> Result<(), CodecError> {
        Version::V1.encode(&mut writer)?;
        self.id.encode(&mut writer)?;
        self.timestamp.encode(&mut writer)?;
        let extensions: CodecVec<u16> = self.extensions.clone().into();
        extensions.encode(&mut writer)?;
        self.signature.encode(&mut writer)?;
        Ok(())
    }
}

impl Decode for Sct {
    fn decode(mut reader: impl Read) -> Result<Self, CodecError> {
        match Version::decode(&mut reader)? {
            Version::V1 => (),
        }
        let id = <[u8; 32]>::decode(&mut reader)?;
        let timestamp = u64::decode(&mut reader)?;
        let extensions: CodecVec<u16> = CodecVec::decode(&mut reader)?;
        let signature = Signature::decode(&mut reader)?;

        Ok(Self {
            id,
            timestamp,
            extensions: extensions.into(),
            signature,
        })
    }
}

impl Hashable for Sct {
    fn hash(&self) -> HashOutput {
        let mut bytes = Cursor::new(vec![]);
        self.encode(&mut bytes).expect("encoding to a Vec never fails");
        Sha256::digest(bytes.into_inner()).into()
    }
}

/// The data that is actually signed -- not what is sent over the wire to
/// the submitter. See RFC 6962 3.2 `digitally-signed struct`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SctSigningInput {
    sct_version: Version,
    timestamp: u64,
    entry: Entry,
    extensions: CodecVec<u16>,
}

impl Encode for SctSigningInput {
    fn encode(&self, mut writer: impl Write) -> Result<(), CodecError> {
        self.sct_version.encode(&mut writer)?;
        SignatureType::CertificateTimestamp.encode(&mut writer)?;
        self.timestamp.encode(&mut writer)?;
        self.entry.encode(&mut writer)?;
        self.extensions.encode(&mut writer)?;
        Ok(())
    }
}

impl Decode for SctSigningInput {
    fn decode(mut reader: impl Read) -> Result<Self, CodecError> {
        let sct_version = Version::decode(&mut reader)?;
        match SignatureType::decode(&mut reader)? {
            SignatureType::TreeHash => return Err(CodecError::UnexpectedVariant),
            SignatureType::CertificateTimestamp => (),
        }
        let timestamp = u64::decode(&mut reader)?;
        let entry = Entry::decode(&mut reader)?;
        let extensions = CodecVec::decode(&mut reader)?;

        Ok(Self {
            sct_version,
            timestamp,
            entry,
            extensions,
        })
    }
}

/// JSON shape of the `add-chain`/`add-pre-chain` response body.
#[derive(Serialize, Deserialize)]
struct SctJson {
    sct_version: u8,
    id: Base64<Vec<u8>>,
    timestamp: u64,
    extensions: Base64<Vec<u8>>,
    signature: Base64<Codec<Signature<SctSigningInput>>>,
}

impl Serialize for Sct {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        SctJson {
            sct_version: 0,
            id: self.id.to_vec().into(),
            timestamp: self.timestamp,
            extensions: self.extensions.clone().into(),
            signature: Codec(self.signature.clone()).into(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Sct {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let json = SctJson::deserialize(deserializer)?;
        if json.sct_version != 0 {
            return Err(de::Error::custom(format!(
                "unsupported sct_version {}",
                json.sct_version
            )));
        }

        let id: [u8; 32] = json
            .id
            .0
            .try_into()
            .map_err(|_| de::Error::custom("log id must be 32 bytes"))?;

        Ok(Self {
            id,
            timestamp: json.timestamp,
            extensions: json.extensions.0,
            signature: json.signature.0.0,
        })
    }
}
