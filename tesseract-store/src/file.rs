use crate::{StringStoreKey, StringStoreValue};
use std::{marker::PhantomData, path::PathBuf};
use tesseract_core::store::AsyncStore;
use tracing::warn;

/// An [`AsyncStore`] that persists one file per key under a base
/// directory, named after the key's [`StringStoreKey::serialize_key`].
///
/// There is no compaction or indexing: listing the directory is the only
/// way to discover keys, so this is meant for stores that are looked up by
/// key (checkpoints, per-submission SCT bookkeeping), not for the Merkle
/// tree's leaf/node stores, which need ordered iteration and stay in
/// memory or behind a tile-backed store instead.
#[derive(Debug, Clone)]
pub struct FilesystemStore<K, V> {
    dir: PathBuf,
    _kv: PhantomData<(K, V)>,
}

impl<K, V> FilesystemStore<K, V> {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            _kv: PhantomData,
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

impl<K: StringStoreKey, V: StringStoreValue> AsyncStore<K, V> for FilesystemStore<K, V> {
    async fn insert(&self, key: K, value: V) {
        let path = self.path_for(&key.serialize_key());

        if let Err(err) = tokio::fs::create_dir_all(&self.dir).await {
            warn!(?err, dir = %self.dir.display(), "failed to create filesystem store directory");
            return;
        }

        if let Err(err) = tokio::fs::write(&path, value.serialize_value()).await {
            warn!(?err, path = %path.display(), "failed to write filesystem store entry");
        }
    }

    async fn get(&self, key: &K) -> Option<V> {
        let path = self.path_for(&key.serialize_key());
        let data = tokio::fs::read_to_string(&path).await.ok()?;
        V::deserialize_value(&data)
    }

    async fn len(&self) -> usize {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(_) => return 0,
        };

        let mut count = 0;
        while let Ok(Some(_)) = entries.next_entry().await {
            count += 1;
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_then_get_roundtrips() {
        let dir = tempdir::TempDir::new("tesseract-store-test").unwrap();
        let store: FilesystemStore<u64, tesseract_core::Sct> =
            FilesystemStore::new(dir.path().to_path_buf());

        let signing_key = p256::ecdsa::SigningKey::random(&mut rand::rngs::OsRng);
        let entry = tesseract_core::Entry {
            entry_type: tesseract_core::EntryType::X509,
            cert_der: vec![1, 2, 3],
            precertificate: vec![],
            issuer_key_hash: [0u8; 32],
            fingerprints_chain: vec![],
        };
        let sct = tesseract_core::Sct::sign([1u8; 32], 42, &entry, &signing_key).unwrap();

        store.insert(0, sct.clone()).await;
        let fetched = store.get(&0).await.unwrap();
        assert_eq!(fetched, sct);
    }

    #[tokio::test]
    async fn get_missing_key_returns_none() {
        let dir = tempdir::TempDir::new("tesseract-store-test").unwrap();
        let store: FilesystemStore<u64, tesseract_core::Sct> =
            FilesystemStore::new(dir.path().to_path_buf());

        assert!(store.get(&7).await.is_none());
    }
}
