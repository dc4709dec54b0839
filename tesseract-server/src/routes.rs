use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use base64::{Engine, prelude::BASE64_STANDARD};
use serde::Deserialize;
use tesseract_core::{LeafData, store::{IndexedStore, Store}, tree::NodeKey};
use tesseract_issuer::AddIssuersIfNotExist;

use crate::orchestrator::{Orchestrator, OrchestratorError};

/// Request body shared by `add-chain` and `add-pre-chain`: a list of
/// base64-encoded DER certificates, leaf first.
#[derive(Debug, Deserialize)]
pub struct AddChainRequest {
    pub chain: Vec<String>,
}

pub fn router<N, L, S>(orchestrator: Arc<Orchestrator<N, L, S>>, path_prefix: &str) -> Router
where
    N: Store<NodeKey, tesseract_core::tree::HashOutput> + Send + Sync + 'static,
    L: IndexedStore<LeafData> + Store<u64, LeafData> + Send + Sync + 'static,
    S: AddIssuersIfNotExist + Send + Sync + 'static,
{
    Router::new()
        .route(&format!("{path_prefix}/ct/v1/add-chain"), post(add_chain))
        .route(&format!("{path_prefix}/ct/v1/add-pre-chain"), post(add_pre_chain))
        .route("/healthz", get(healthz))
        .with_state(orchestrator)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn add_chain<N, L, S>(
    State(orchestrator): State<Arc<Orchestrator<N, L, S>>>,
    Json(request): Json<AddChainRequest>,
) -> Response
where
    N: Store<NodeKey, tesseract_core::tree::HashOutput> + Send + Sync + 'static,
    L: IndexedStore<LeafData> + Store<u64, LeafData> + Send + Sync + 'static,
    S: AddIssuersIfNotExist + Send + Sync + 'static,
{
    submit_chain(orchestrator, request, false).await
}

async fn add_pre_chain<N, L, S>(
    State(orchestrator): State<Arc<Orchestrator<N, L, S>>>,
    Json(request): Json<AddChainRequest>,
) -> Response
where
    N: Store<NodeKey, tesseract_core::tree::HashOutput> + Send + Sync + 'static,
    L: IndexedStore<LeafData> + Store<u64, LeafData> + Send + Sync + 'static,
    S: AddIssuersIfNotExist + Send + Sync + 'static,
{
    submit_chain(orchestrator, request, true).await
}

async fn submit_chain<N, L, S>(
    orchestrator: Arc<Orchestrator<N, L, S>>,
    request: AddChainRequest,
    is_precert: bool,
) -> Response
where
    N: Store<NodeKey, tesseract_core::tree::HashOutput> + Send + Sync + 'static,
    L: IndexedStore<LeafData> + Store<u64, LeafData> + Send + Sync + 'static,
    S: AddIssuersIfNotExist + Send + Sync + 'static,
{
    let der_certs: Result<Vec<Vec<u8>>, _> = request
        .chain
        .iter()
        .map(|cert| BASE64_STANDARD.decode(cert))
        .collect();

    let der_certs = match der_certs {
        Ok(der_certs) => der_certs,
        Err(_) => {
            return (StatusCode::BAD_REQUEST, "chain entries must be valid base64").into_response();
        }
    };

    match orchestrator.submit(der_certs, is_precert).await {
        Ok(sct) => (StatusCode::OK, Json(sct)).into_response(),
        Err(err) => err.into_response(),
    }
}

impl IntoResponse for OrchestratorError {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self, "submission rejected");

        let status = match &self {
            OrchestratorError::BadInput(_) => StatusCode::BAD_REQUEST,
            OrchestratorError::PolicyRejected(_) => StatusCode::BAD_REQUEST,
            OrchestratorError::UntrustedRoot => StatusCode::BAD_REQUEST,
            OrchestratorError::Pushback(_) => StatusCode::SERVICE_UNAVAILABLE,
            OrchestratorError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            OrchestratorError::StorageUnavailable => StatusCode::INTERNAL_SERVER_ERROR,
            OrchestratorError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, self.to_string()).into_response()
    }
}
