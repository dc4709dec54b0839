//! Submit path (C8): wires the validator (C1), entry builder (C2), issuer
//! store (C3), appender (C4/C5) and publication awaiter (C6) into a single
//! orchestrator, and exposes it over the static-CT-API's `add-chain` and
//! `add-pre-chain` endpoints.

mod orchestrator;
mod routes;

pub use orchestrator::{Orchestrator, OrchestratorError};
pub use routes::{AddChainRequest, router};
