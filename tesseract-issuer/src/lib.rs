//! Issuer store (C3): persists the non-leaf certificates of a submitted
//! chain so that a later `get-entries`/tile reader can reconstruct the full
//! chain a leaf was issued under.
//!
//! Keys are content-addressed (`hex(SHA256(DER))`), so the store is
//! write-once: two submissions presenting the same issuer certificate write
//! the same bytes under the same key, and a write that loses a race with
//! another writer of the identical bytes is harmless.

use std::{future::Future, num::NonZeroUsize, sync::Mutex};

use lru::LruCache;
use tesseract_core::{Certificate, CertificateError};
use tesseract_store::MemoryStore;

/// One in-process cache slot per distinct issuer certificate already known
/// to be present, bounding memory at 2^20 entries regardless of how many
/// distinct issuers the backend physically holds.
const CACHE_CAPACITY: usize = 1 << 20;

/// Capability trait for "persist these issuer certificates if they are not
/// already present" -- a narrower surface than a full key-value store, so
/// callers that only need to add issuers (the submit orchestrator) don't
/// depend on the backend's read path.
pub trait AddIssuersIfNotExist {
    fn add_issuers_if_not_exist(
        &self,
        issuers: &[Certificate],
    ) -> impl Future<Output = Result<(), IssuerStoreError>>;
}

/// An issuer store backed by any [`tesseract_core::store::AsyncStore`] that
/// maps hex-encoded SHA-256 keys to DER bytes.
pub struct IssuerStore<S> {
    backend: S,
    cache: Mutex<LruCache<[u8; 32], ()>>,
}

impl<S> IssuerStore<S> {
    pub fn new(backend: S) -> Self {
        Self {
            backend,
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(CACHE_CAPACITY).expect("CACHE_CAPACITY is nonzero"),
            )),
        }
    }

    pub fn in_memory() -> IssuerStore<MemoryStore<String, Vec<u8>>> {
        IssuerStore::new(MemoryStore::default())
    }
}

impl<S> AddIssuersIfNotExist for IssuerStore<S>
where
    S: tesseract_core::store::AsyncStore<String, Vec<u8>> + Sync,
{
    async fn add_issuers_if_not_exist(&self, issuers: &[Certificate]) -> Result<(), IssuerStoreError> {
        for issuer in issuers {
            let der = issuer.to_der().map_err(IssuerStoreError::Certificate)?;
            let key = issuer_key(&der);

            if self.cache.lock().unwrap().contains(&key) {
                continue;
            }

            if self.backend.get(&hex::encode(key)).await.is_none() {
                tracing::debug!(key = %hex::encode(key), "writing new issuer certificate");
                self.backend.insert(hex::encode(key), der).await;
            }

            self.cache.lock().unwrap().put(key, ());
        }

        Ok(())
    }
}

fn issuer_key(der: &[u8]) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    Sha256::digest(der).into()
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IssuerStoreError {
    #[error("failed to encode issuer certificate: {0}")]
    Certificate(CertificateError),
}

impl tesseract_core::CheckSeverity for IssuerStoreError {
    fn severity(&self) -> tesseract_core::Severity {
        match self {
            IssuerStoreError::Certificate(err) => {
                use tesseract_core::CheckSeverity as _;
                err.severity()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERMEDIATE_PEM: &str = include_str!("../../testdata/intermediate.pem");

    #[tokio::test]
    async fn adding_the_same_issuer_twice_is_idempotent() {
        let store = IssuerStore::in_memory();
        let issuer = Certificate::from_pem(INTERMEDIATE_PEM).unwrap();

        store.add_issuers_if_not_exist(&[issuer.clone()]).await.unwrap();
        store.add_issuers_if_not_exist(&[issuer.clone()]).await.unwrap();

        let der = issuer.to_der().unwrap();
        let key = hex::encode(issuer_key(&der));
        assert_eq!(store.backend.get(&key).await, Some(der));
    }

    #[tokio::test]
    async fn cache_short_circuits_repeated_adds() {
        let store = IssuerStore::in_memory();
        let issuer = Certificate::from_pem(INTERMEDIATE_PEM).unwrap();

        store.add_issuers_if_not_exist(&[issuer.clone()]).await.unwrap();
        let der = issuer.to_der().unwrap();
        let key = issuer_key(&der);
        assert!(store.cache.lock().unwrap().contains(&key));
    }
}
