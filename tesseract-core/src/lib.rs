//! Shared data model for the CT log: certificate parsing, the append-only
//! Merkle tree, tiling/checkpoint geometry, and the binary codec used for
//! the leaf/entry-bundle wire formats.

mod cert;
mod chain;
mod entry;
pub mod errors;
mod sct;
pub mod store;
pub mod tiling;
pub mod tree;
pub mod utils;
mod version;

pub use cert::{Certificate, CertificateError, Fingerprint};
pub use chain::{CertificateChain, ChainError};
pub use entry::{Entry, EntryType, LeafData};
pub use errors::{CheckSeverity, Severity};
pub use sct::{Sct, SctError};
pub use version::Version;

/// SHA256 of the log signer's DER-encoded `SubjectPublicKeyInfo`.
///
/// See `c2sp.org/static-ct-api`: the log ID used in both checkpoints and
/// SCTs is derived this way, never configured independently.
pub fn log_id(spki_der: &[u8]) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    Sha256::digest(spki_der).into()
}

#[cfg(test)]
pub(crate) mod tests {
    pub(crate) const ROOT_PEM: &str = include_str!("../../testdata/root.pem");
    pub(crate) const INTERMEDIATE_PEM: &str = include_str!("../../testdata/intermediate.pem");
    pub(crate) const PRE_ISSUER_PEM: &str = include_str!("../../testdata/pre_issuer.pem");
    pub(crate) const LEAF_PEM: &str = include_str!("../../testdata/leaf.pem");
    pub(crate) const PRECERT_DIRECT_PEM: &str =
        include_str!("../../testdata/precert_direct.pem");
    pub(crate) const PRECERT_WITH_PREISSUER_PEM: &str =
        include_str!("../../testdata/precert_with_preissuer.pem");
    pub(crate) const LEAF_EXPIRED_PEM: &str = include_str!("../../testdata/leaf_expired.pem");
    pub(crate) const LEAF_NOT_YET_VALID_PEM: &str =
        include_str!("../../testdata/leaf_not_yet_valid.pem");
    pub(crate) const PRE_ISSUER_NOT_CA_PEM: &str =
        include_str!("../../testdata/pre_issuer_not_ca.pem");
    pub(crate) const ISSUER_NOT_CA_PEM: &str = include_str!("../../testdata/issuer_not_ca.pem");
}
