use crate::{
    store::Hashable,
    tree::HashOutput,
    utils::codec::{CodecError, Decode, Encode},
};
use sha2::{Digest, Sha256};
use std::io::{Cursor, Read, Write};

/// The kind of certificate a log [`Entry`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    X509,
    Precert,
}

impl Encode for EntryType {
    fn encode(&self, mut writer: impl Write) -> Result<(), CodecError> {
        let discriminant: u16 = match self {
            EntryType::X509 => 0,
            EntryType::Precert => 1,
        };
        discriminant.encode(&mut writer)
    }
}

impl Decode for EntryType {
    fn decode(mut reader: impl Read) -> Result<Self, CodecError> {
        match u16::decode(&mut reader)? {
            0 => Ok(EntryType::X509),
            1 => Ok(EntryType::Precert),
            x => Err(CodecError::UnknownVariant("EntryType", x as u64)),
        }
    }
}

/// The canonical, deterministic unit the log sequences.
///
/// For an ordinary certificate, `cert_der` is the DER certificate itself and
/// `precertificate` is empty. For a precertificate, `cert_der` is the
/// *defanged* TBSCertificate (poison and embedded-SCT extensions stripped,
/// Issuer/AKI rewritten if a pre-issuer was used), `precertificate` is the
/// raw DER of the precertificate as submitted, and `issuer_key_hash` is the
/// SHA-256 of the real issuing CA's `SubjectPublicKeyInfo`.
///
/// `fingerprints_chain` lists the SHA-256 of every certificate above the leaf
/// in the submitted chain, excluding any CT pre-issuer.
///
/// Two submissions that resolve to the same `Entry` bytes are the same leaf
/// for dedupe purposes (C5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub entry_type: EntryType,
    pub cert_der: Vec<u8>,
    pub precertificate: Vec<u8>,
    pub issuer_key_hash: [u8; 32],
    pub fingerprints_chain: Vec<[u8; 32]>,
}

impl Entry {
    /// Canonical encoding used both as the dedupe key and as the payload
    /// hashed into the Merkle tree (wrapped in [`LeafData`]).
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Cursor::new(vec![]);
        self.encode(&mut buf).expect("encoding to a Vec never fails");
        buf.into_inner()
    }

    pub fn dedupe_key(&self) -> [u8; 32] {
        Sha256::digest(self.canonical_bytes()).into()
    }
}

fn encode_u32_prefixed(data: &[u8], mut writer: impl Write) -> Result<(), CodecError> {
    let len: u32 = data.len().try_into().map_err(|_| CodecError::VectorTooLong {
        received: data.len(),
        max: u32::MAX as usize,
    })?;
    len.encode(&mut writer)?;
    writer.write_all(data)?;
    Ok(())
}

fn decode_u32_prefixed(mut reader: impl Read) -> Result<Vec<u8>, CodecError> {
    let len = u32::decode(&mut reader)? as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

impl Encode for Entry {
    fn encode(&self, mut writer: impl Write) -> Result<(), CodecError> {
        self.entry_type.encode(&mut writer)?;
        if self.entry_type == EntryType::Precert {
            self.issuer_key_hash.encode(&mut writer)?;
            encode_u32_prefixed(&self.precertificate, &mut writer)?;
        }
        encode_u32_prefixed(&self.cert_der, &mut writer)?;

        let fingerprint_count: u16 = self.fingerprints_chain.len().try_into().map_err(|_| {
            CodecError::VectorTooLong {
                received: self.fingerprints_chain.len(),
                max: u16::MAX as usize,
            }
        })?;
        fingerprint_count.encode(&mut writer)?;
        for fingerprint in &self.fingerprints_chain {
            fingerprint.encode(&mut writer)?;
        }
        Ok(())
    }
}

impl Decode for Entry {
    fn decode(mut reader: impl Read) -> Result<Self, CodecError> {
        let entry_type = EntryType::decode(&mut reader)?;
        let (issuer_key_hash, precertificate) = if entry_type == EntryType::Precert {
            let issuer_key_hash = <[u8; 32]>::decode(&mut reader)?;
            let precertificate = decode_u32_prefixed(&mut reader)?;
            (issuer_key_hash, precertificate)
        } else {
            ([0u8; 32], vec![])
        };
        let cert_der = decode_u32_prefixed(&mut reader)?;

        let fingerprint_count = u16::decode(&mut reader)? as usize;
        let mut fingerprints_chain = Vec::with_capacity(fingerprint_count);
        for _ in 0..fingerprint_count {
            fingerprints_chain.push(<[u8; 32]>::decode(&mut reader)?);
        }

        Ok(Self {
            entry_type,
            cert_der,
            precertificate,
            issuer_key_hash,
            fingerprints_chain,
        })
    }
}

/// The RFC 6962 `MerkleTreeLeaf` payload: an [`Entry`] plus the sequencing
/// timestamp assigned by the appender. This, length-prefixed with the
/// RFC 6962 leaf prefix (`0x00`), is what gets hashed into the tree and
/// written into entry bundles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafData {
    pub timestamp: u64,
    pub entry: Entry,
}

impl Encode for LeafData {
    fn encode(&self, mut writer: impl Write) -> Result<(), CodecError> {
        self.timestamp.encode(&mut writer)?;
        self.entry.encode(&mut writer)?;
        Ok(())
    }
}

impl Decode for LeafData {
    fn decode(mut reader: impl Read) -> Result<Self, CodecError> {
        Ok(Self {
            timestamp: u64::decode(&mut reader)?,
            entry: Entry::decode(&mut reader)?,
        })
    }
}

impl Hashable for LeafData {
    /// RFC 6962 2.1: `SHA256(0x00 || leaf_data)`.
    fn hash(&self) -> HashOutput {
        let mut data = Cursor::new(vec![0x00]);
        data.set_position(1);
        self.encode(&mut data).expect("encoding to a Vec never fails");
        Sha256::digest(data.into_inner()).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry() -> Entry {
        Entry {
            entry_type: EntryType::X509,
            cert_der: vec![1, 2, 3, 4],
            precertificate: vec![],
            issuer_key_hash: [0u8; 32],
            fingerprints_chain: vec![[7u8; 32], [8u8; 32]],
        }
    }

    #[test]
    fn entry_roundtrips() {
        let entry = sample_entry();
        let bytes = entry.canonical_bytes();
        let decoded = Entry::decode(Cursor::new(bytes)).unwrap();
        assert_eq!(entry, decoded);
    }

    #[test]
    fn dedupe_key_is_deterministic() {
        let a = sample_entry();
        let b = sample_entry();
        assert_eq!(a.dedupe_key(), b.dedupe_key());
    }

    #[test]
    fn leaf_hash_uses_leaf_prefix() {
        let leaf = LeafData {
            timestamp: 1234,
            entry: sample_entry(),
        };
        let mut raw = vec![0x00];
        leaf.encode(&mut raw).unwrap();
        let expected: [u8; 32] = Sha256::digest(&raw).into();
        assert_eq!(leaf.hash(), expected);
    }
}
