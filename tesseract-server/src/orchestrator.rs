use std::{sync::Arc, time::Duration};

use tesseract_core::{
    CertificateChain, CertificateError, ChainError, CheckSeverity, Entry, LeafData, Sct,
    store::{IndexedStore, Store},
    tree::NodeKey,
};
use tesseract_entry::EntryBuildError;
use tesseract_issuer::{AddIssuersIfNotExist, IssuerStoreError};
use tesseract_sequencer::{AppendError, Appender, AwaitError, PublicationAwaiter, PushbackError};
use tesseract_signer::{Signer, SignerError};
use tesseract_validate::{Validator, ValidationError};
use thiserror::Error;

/// Wiring and execution of the submit path (C8): parse, validate (C1),
/// build the canonical entry (C2), persist issuers (C3) and sequence the
/// entry (C4) concurrently, recover the timestamp of a duplicate or wait
/// for publication (C6), then sign (C7).
pub struct Orchestrator<N, L, S> {
    validator: Validator,
    appender: Arc<Appender<N, L>>,
    awaiter: Arc<PublicationAwaiter<L>>,
    enable_publication_awaiter: bool,
    issuers: Arc<S>,
    signer: Arc<Signer>,
    http_deadline: Duration,
}

impl<N, L, S> Orchestrator<N, L, S>
where
    N: Store<NodeKey, tesseract_core::tree::HashOutput> + Send + Sync,
    L: IndexedStore<LeafData> + Store<u64, LeafData> + Send + Sync,
    S: AddIssuersIfNotExist + Send + Sync,
{
    pub fn new(
        validator: Validator,
        appender: Arc<Appender<N, L>>,
        awaiter: Arc<PublicationAwaiter<L>>,
        enable_publication_awaiter: bool,
        issuers: Arc<S>,
        signer: Arc<Signer>,
        http_deadline: Duration,
    ) -> Self {
        Self {
            validator,
            appender,
            awaiter,
            enable_publication_awaiter,
            issuers,
            signer,
            http_deadline,
        }
    }

    /// Runs the full submit pipeline for a chain already decoded into raw
    /// DER certificates. `is_precert` is the classification declared by
    /// whichever endpoint (`add-chain` vs `add-pre-chain`) the caller used;
    /// the validator rejects a chain whose actual poison shape disagrees.
    pub async fn submit(&self, der_certs: Vec<Vec<u8>>, is_precert: bool) -> Result<Sct, OrchestratorError> {
        let chain = CertificateChain::from_der_list(der_certs)?;
        self.validator.validate(&chain, is_precert)?;
        let entry = tesseract_entry::build_entry(&chain)?;

        let issuer_certs = chain.as_slice()[1..].to_vec();
        let timestamp = now_millis();

        let (issuer_result, append_result) = tokio::join!(
            self.issuers.add_issuers_if_not_exist(&issuer_certs),
            std::future::ready(self.appender.add(entry.clone(), timestamp)),
        );
        issuer_result?;
        let index_future = append_result?;

        let assign = with_deadline(self.http_deadline, index_future).await?;

        // Duplicate timestamp recovery (C6) always runs: the SCT must carry
        // the originally committed timestamp, never the resubmission's own.
        // `enable_publication_awaiter` only gates waiting for full
        // integration below, on the non-duplicate path.
        let sct_timestamp = if assign.is_duplicate {
            with_deadline(self.http_deadline, self.awaiter.recover_duplicate_timestamp(assign.index)).await?
        } else {
            timestamp
        };

        if self.enable_publication_awaiter && !assign.is_duplicate {
            with_deadline(self.http_deadline, self.awaiter.await_publication(assign.index)).await?;
        }

        Ok(self.signer.sign(sct_timestamp, &entry)?)
    }
}

async fn with_deadline<T, E>(
    deadline: Duration,
    fut: impl std::future::Future<Output = Result<T, E>>,
) -> Result<T, OrchestratorError>
where
    OrchestratorError: From<E>,
{
    tokio::time::timeout(deadline, fut)
        .await
        .map_err(|_| OrchestratorError::StorageUnavailable)?
        .map_err(OrchestratorError::from)
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock is after 1970")
        .as_millis() as u64
}

/// The error taxonomy used for every HTTP status mapping in the submit
/// path.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("malformed submission: {0}")]
    BadInput(#[from] CertificateError),

    #[error("submission rejected by policy: {0}")]
    PolicyRejected(ValidationError),

    #[error("chain does not anchor to a trusted root")]
    UntrustedRoot,

    #[error("the log is applying pushback: {0}")]
    Pushback(String),

    #[error("the request was cancelled")]
    Cancelled,

    #[error("a storage backend is unavailable")]
    StorageUnavailable,

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ValidationError> for OrchestratorError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::UntrustedRoot => OrchestratorError::UntrustedRoot,
            other => OrchestratorError::PolicyRejected(other),
        }
    }
}

impl From<ChainError> for OrchestratorError {
    fn from(err: ChainError) -> Self {
        OrchestratorError::BadInput(match err {
            ChainError::Certificate(inner) => inner,
            ChainError::MissingPreIssuerParent => CertificateError::InvalidChain,
            ChainError::PreIssuerParentNotCa => CertificateError::InvalidChain,
        })
    }
}

impl From<EntryBuildError> for OrchestratorError {
    fn from(err: EntryBuildError) -> Self {
        match err {
            EntryBuildError::Certificate(inner) => inner.into(),
            _ => OrchestratorError::BadInput(CertificateError::InvalidChain),
        }
    }
}

impl From<IssuerStoreError> for OrchestratorError {
    fn from(err: IssuerStoreError) -> Self {
        match err.severity() {
            tesseract_core::Severity::Unsafe => OrchestratorError::BadInput(match err {
                IssuerStoreError::Certificate(inner) => inner,
            }),
            tesseract_core::Severity::Inconclusive => OrchestratorError::StorageUnavailable,
        }
    }
}

impl From<PushbackError> for OrchestratorError {
    fn from(err: PushbackError) -> Self {
        OrchestratorError::Pushback(err.to_string())
    }
}

impl From<AppendError> for OrchestratorError {
    fn from(_: AppendError) -> Self {
        OrchestratorError::Cancelled
    }
}

impl From<AwaitError> for OrchestratorError {
    fn from(err: AwaitError) -> Self {
        match err {
            AwaitError::Pushback { .. } => OrchestratorError::Pushback(err.to_string()),
            AwaitError::SourceClosed | AwaitError::EntryMissing { .. } => {
                OrchestratorError::StorageUnavailable
            }
        }
    }
}

impl From<SignerError> for OrchestratorError {
    fn from(err: SignerError) -> Self {
        OrchestratorError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tesseract_core::{store::MemoryStore, tree::Tree};
    use tesseract_issuer::IssuerStore;
    use tesseract_sequencer::AppenderConfig;
    use tesseract_validate::{TrustStore, ValidatorConfig};

    const ROOT_PEM: &str = include_str!("../../testdata/root.pem");
    const INTERMEDIATE_PEM: &str = include_str!("../../testdata/intermediate.pem");
    const LEAF_PEM: &str = include_str!("../../testdata/leaf.pem");
    const LEAF_EXPIRED_PEM: &str = include_str!("../../testdata/leaf_expired.pem");
    const PRE_ISSUER_PEM: &str = include_str!("../../testdata/pre_issuer.pem");
    const PRECERT_WITH_PREISSUER_PEM: &str = include_str!("../../testdata/precert_with_preissuer.pem");
    const SIGNER_PKCS8: &str = include_str!("../../testdata/signer_pkcs8.key");

    fn der_chain(pems: &[&str]) -> Vec<Vec<u8>> {
        pems.iter()
            .map(|pem| tesseract_core::Certificate::from_pem(pem).unwrap().to_der().unwrap())
            .collect()
    }

    type TestOrchestrator = Orchestrator<
        MemoryStore<NodeKey, tesseract_core::tree::HashOutput>,
        MemoryStore<u64, LeafData>,
        IssuerStore<MemoryStore<String, Vec<u8>>>,
    >;

    fn orchestrator_with_trust_store(config: ValidatorConfig, trust_store: TrustStore) -> TestOrchestrator {
        let validator = Validator::new(config, trust_store);

        let leafs = MemoryStore::default();
        let tree = Tree::new(MemoryStore::default(), leafs.clone());
        let appender = Arc::new(Appender::new(tree, 1024, AppenderConfig::default()));

        let (_head_tx, head_rx) = tokio::sync::watch::channel(appender.tree_head());
        let awaiter = Arc::new(PublicationAwaiter::new(head_rx, leafs, 16));

        let issuers = Arc::new(IssuerStore::in_memory());
        let signer = Arc::new(Signer::from_pkcs8_pem(SIGNER_PKCS8).unwrap());

        Orchestrator::new(
            validator,
            appender,
            awaiter,
            false,
            issuers,
            signer,
            Duration::from_secs(5),
        )
    }

    fn test_orchestrator(config: ValidatorConfig) -> TestOrchestrator {
        orchestrator_with_trust_store(config, TrustStore::from_pem_bundle(ROOT_PEM).unwrap())
    }

    fn default_config() -> ValidatorConfig {
        ValidatorConfig::new(false, false, None, vec![], None, None).unwrap()
    }

    #[tokio::test]
    async fn ok_cert_resubmission_is_deduplicated() {
        let orchestrator = test_orchestrator(default_config());
        let chain = der_chain(&[LEAF_PEM, INTERMEDIATE_PEM]);

        let first = orchestrator.submit(chain.clone(), false).await.unwrap();
        let second = orchestrator.submit(chain, false).await.unwrap();

        assert_eq!(first.timestamp, second.timestamp);
        assert_eq!(first.signature, second.signature);
    }

    // The first submission's timestamp must survive a later resubmission of
    // the same chain even with publication-awaiting turned off, since C6
    // recovery is unconditional. A millisecond gap between submissions
    // makes a timestamp mismatch (the regression this guards against)
    // unmissable rather than a coincidental pass.
    #[tokio::test]
    async fn duplicate_resubmission_keeps_original_timestamp_without_publication_awaiter() {
        let orchestrator = test_orchestrator(default_config());
        let chain = der_chain(&[LEAF_PEM, INTERMEDIATE_PEM]);

        let first = orchestrator.submit(chain.clone(), false).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = orchestrator.submit(chain, false).await.unwrap();

        assert_eq!(first.timestamp, second.timestamp);
    }

    #[tokio::test]
    async fn expired_leaf_is_rejected_when_configured() {
        let config = ValidatorConfig::new(true, false, None, vec![], None, None).unwrap();
        let orchestrator = test_orchestrator(config);
        let chain = der_chain(&[LEAF_EXPIRED_PEM, INTERMEDIATE_PEM]);

        assert!(matches!(
            orchestrator.submit(chain, false).await,
            Err(OrchestratorError::PolicyRejected(ValidationError::Expired))
        ));
    }

    #[tokio::test]
    async fn precert_with_preissuer_chain_is_accepted() {
        let orchestrator = test_orchestrator(default_config());
        let chain = der_chain(&[PRECERT_WITH_PREISSUER_PEM, PRE_ISSUER_PEM, INTERMEDIATE_PEM]);

        orchestrator.submit(chain, true).await.unwrap();
    }

    #[tokio::test]
    async fn precert_submitted_to_add_chain_is_rejected() {
        let orchestrator = test_orchestrator(default_config());
        let chain = der_chain(&[PRECERT_WITH_PREISSUER_PEM, PRE_ISSUER_PEM, INTERMEDIATE_PEM]);

        assert!(matches!(
            orchestrator.submit(chain, false).await,
            Err(OrchestratorError::PolicyRejected(ValidationError::PoisonMismatch))
        ));
    }

    #[tokio::test]
    async fn plain_cert_submitted_to_add_pre_chain_is_rejected() {
        let orchestrator = test_orchestrator(default_config());
        let chain = der_chain(&[LEAF_PEM, INTERMEDIATE_PEM]);

        assert!(matches!(
            orchestrator.submit(chain, true).await,
            Err(OrchestratorError::PolicyRejected(ValidationError::PoisonMismatch))
        ));
    }

    #[tokio::test]
    async fn untrusted_chain_is_rejected() {
        let orchestrator = orchestrator_with_trust_store(default_config(), TrustStore::default());
        let chain = der_chain(&[LEAF_PEM, INTERMEDIATE_PEM]);
        assert!(matches!(
            orchestrator.submit(chain, false).await,
            Err(OrchestratorError::UntrustedRoot)
        ));
    }

    #[test]
    fn chain_parsing_rejects_single_certificate_submissions() {
        let chain = der_chain(&[LEAF_PEM]);
        assert!(matches!(
            CertificateChain::from_der_list(chain),
            Err(CertificateError::InvalidChain)
        ));
    }
}
