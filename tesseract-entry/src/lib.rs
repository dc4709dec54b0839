//! Entry builder (C2). Wraps
//! [`tesseract_core::CertificateChain::build_entry`]'s defanged-TBS
//! reconstruction, translating its errors into the three failure modes a
//! submit path needs to tell apart: a chain with no issuer at all, a
//! precertificate whose pre-issuer has no parent above it, and a
//! malformed TBS (an unparseable or incorrectly-poisoned precertificate).

use tesseract_core::{CertificateChain, CertificateError, ChainError, CheckSeverity, Entry, Severity};
use thiserror::Error;

pub fn build_entry(chain: &CertificateChain) -> Result<Entry, EntryBuildError> {
    if chain.as_slice().len() < 2 {
        return Err(EntryBuildError::NoIssuer);
    }

    tracing::debug!("building entry from validated chain");

    chain.build_entry().map_err(|err| match err {
        ChainError::MissingPreIssuerParent => EntryBuildError::NoFinalIssuer,
        ChainError::PreIssuerParentNotCa => EntryBuildError::NoFinalIssuer,
        ChainError::Certificate(CertificateError::InvalidPreCert) => EntryBuildError::MalformedTbs,
        other => EntryBuildError::Certificate(other),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntryBuildError {
    #[error("the chain has no certificate above the leaf to act as issuer")]
    NoIssuer,

    #[error("the leaf is a precertificate signed by a pre-issuer with no issuer above it")]
    NoFinalIssuer,

    #[error("the leaf's TBS certificate is malformed (bad poison extension)")]
    MalformedTbs,

    #[error("failed to build the entry: {0}")]
    Certificate(ChainError),
}

impl CheckSeverity for EntryBuildError {
    fn severity(&self) -> Severity {
        match self {
            EntryBuildError::NoIssuer => Severity::Unsafe,
            EntryBuildError::NoFinalIssuer => Severity::Unsafe,
            EntryBuildError::MalformedTbs => Severity::Unsafe,
            EntryBuildError::Certificate(err) => match err {
                ChainError::Certificate(inner) => inner.severity(),
                ChainError::MissingPreIssuerParent => Severity::Unsafe,
                ChainError::PreIssuerParentNotCa => Severity::Unsafe,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tesseract_core::Certificate;

    const LEAF_PEM: &str = include_str!("../../testdata/leaf.pem");
    const INTERMEDIATE_PEM: &str = include_str!("../../testdata/intermediate.pem");
    const PRECERT_WITH_PREISSUER_PEM: &str = include_str!("../../testdata/precert_with_preissuer.pem");
    const PRE_ISSUER_PEM: &str = include_str!("../../testdata/pre_issuer.pem");

    fn chain_of(pems: &[&str]) -> CertificateChain {
        pems.iter()
            .map(|pem| Certificate::from_pem(pem).unwrap())
            .collect::<Vec<_>>()
            .into()
    }

    #[test]
    fn builds_entry_for_ordinary_leaf() {
        let chain = chain_of(&[LEAF_PEM, INTERMEDIATE_PEM]);
        build_entry(&chain).unwrap();
    }

    #[test]
    fn single_cert_chain_is_no_issuer() {
        let chain = chain_of(&[LEAF_PEM]);
        assert_eq!(build_entry(&chain), Err(EntryBuildError::NoIssuer));
    }

    #[test]
    fn preissuer_with_no_parent_is_no_final_issuer() {
        let chain = chain_of(&[PRECERT_WITH_PREISSUER_PEM, PRE_ISSUER_PEM]);
        assert_eq!(build_entry(&chain), Err(EntryBuildError::NoFinalIssuer));
    }
}
