use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::Parser;
use const_oid::db::rfc5280;
use p256::pkcs8::ObjectIdentifier;
use tesseract_sequencer::AppenderConfig;
use tesseract_validate::ValidatorConfig;

/// Flags recognized by the `tesseract` log server, following the CLI
/// surface already established by static-CT-API deployments: one process,
/// one log identity, one signing key.
#[derive(Parser, Debug)]
#[command(name = "tesseract", version, about, long_about = None)]
pub(crate) struct Args {
    /// Log identity string baked into checkpoints (c2sp.org/checkpoint).
    #[arg(long)]
    pub(crate) origin: String,

    /// PEM bundle of roots the chain validator trusts.
    #[arg(long)]
    pub(crate) roots_pem_file: PathBuf,

    /// PKCS#8 PEM file holding the log's ECDSA P-256 signing key.
    #[arg(long)]
    pub(crate) signing_key_file: PathBuf,

    /// Reject chains whose leaf has already expired.
    #[arg(long)]
    pub(crate) reject_expired: bool,

    /// Reject chains whose leaf has not yet expired.
    #[arg(long)]
    pub(crate) reject_unexpired: bool,

    /// Comma-separated extended key usage allow-list (e.g.
    /// `ServerAuth,ClientAuth`). Unset accepts any EKU.
    #[arg(long, value_delimiter = ',')]
    pub(crate) ext_key_usages: Option<Vec<String>>,

    /// Comma-separated dotted-decimal extension OIDs to reject outright
    /// (e.g. `2.5.29.17`), independent of `ext_key_usages`.
    #[arg(long, value_delimiter = ',')]
    pub(crate) reject_extension: Vec<String>,

    /// RFC3339 UTC lower bound on leaf NotAfter.
    #[arg(long)]
    pub(crate) not_after_start: Option<String>,

    /// RFC3339 UTC upper bound (exclusive) on leaf NotAfter.
    #[arg(long)]
    pub(crate) not_after_limit: Option<String>,

    /// Maximum interval, in seconds, between published checkpoints.
    #[arg(long, default_value_t = 1)]
    pub(crate) checkpoint_interval: u64,

    /// Maximum number of entries the sequencer batches before flushing.
    #[arg(long, default_value_t = 256)]
    pub(crate) batch_max_size: usize,

    /// Maximum age, in milliseconds, of the oldest pending entry before a
    /// partial batch is flushed anyway.
    #[arg(long, default_value_t = 500)]
    pub(crate) batch_max_age_ms: u64,

    /// Reject new submissions once this many entries are awaiting
    /// sequencing.
    #[arg(long, default_value_t = 1 << 16)]
    pub(crate) pushback_max_outstanding: usize,

    /// Reject duplicate-timestamp recovery once this many are in flight at
    /// once.
    #[arg(long, default_value_t = 1 << 12)]
    pub(crate) pushback_max_dedupe_in_flight: usize,

    /// Accepted for compatibility with the static-CT-API flag surface; not
    /// enforced as a distinct limit by this build (antispam backlog is
    /// already bounded by `inmemory_antispam_cache_size`).
    #[arg(long, default_value_t = 1 << 16)]
    pub(crate) pushback_max_antispam_lag: usize,

    /// Block `add-chain`/`add-pre-chain` until the entry is actually
    /// integrated into a published checkpoint before returning the SCT.
    #[arg(long)]
    pub(crate) enable_publication_awaiter: bool,

    /// Size of the in-memory antispam (dedupe) LRU cache. Accepts SI
    /// suffixes (`k`, `Ki`, `M`, `Mi`, ...).
    #[arg(long, default_value = "1Mi")]
    pub(crate) inmemory_antispam_cache_size: String,

    /// Address the HTTP surface listens on.
    #[arg(long, default_value = "127.0.0.1:6962")]
    pub(crate) http_endpoint: SocketAddr,

    /// Deadline, in milliseconds, for the whole submit pipeline (sequencing
    /// and, if enabled, publication wait) before `STORAGE_UNAVAILABLE` is
    /// returned.
    #[arg(long, default_value_t = 10_000)]
    pub(crate) http_deadline_ms: u64,

    /// Path prefix the `ct/v1/*` routes are mounted under.
    #[arg(long, default_value = "")]
    pub(crate) path_prefix: String,

    /// Directory the signed checkpoint is published to. Serving it (and
    /// the tile tree it describes) statically is outside this process.
    #[arg(long, default_value = "./tesseract-data")]
    pub(crate) checkpoint_dir: PathBuf,
}

impl Args {
    pub(crate) fn checkpoint_interval(&self) -> Duration {
        Duration::from_secs(self.checkpoint_interval)
    }

    pub(crate) fn http_deadline(&self) -> Duration {
        Duration::from_millis(self.http_deadline_ms)
    }

    pub(crate) fn appender_config(&self) -> AppenderConfig {
        AppenderConfig {
            batch_max_size: self.batch_max_size,
            batch_max_age: Duration::from_millis(self.batch_max_age_ms),
            checkpoint_interval: self.checkpoint_interval(),
            pushback_max_outstanding: self.pushback_max_outstanding,
        }
    }

    pub(crate) fn dedupe_cache_size(&self) -> eyre::Result<usize> {
        parse_si_size(&self.inmemory_antispam_cache_size)
    }

    pub(crate) fn validator_config(&self) -> eyre::Result<ValidatorConfig> {
        let allowed_ekus = self
            .ext_key_usages
            .as_ref()
            .map(|names| parse_ekus(names))
            .transpose()?;
        let rejected_extensions = parse_oids(&self.reject_extension)?;

        let not_after_start = self
            .not_after_start
            .as_deref()
            .map(parse_rfc3339)
            .transpose()?;
        let not_after_limit = self
            .not_after_limit
            .as_deref()
            .map(parse_rfc3339)
            .transpose()?;

        Ok(ValidatorConfig::new(
            self.reject_expired,
            self.reject_unexpired,
            allowed_ekus,
            rejected_extensions,
            not_after_start,
            not_after_limit,
        )?)
    }
}

/// Maps the names accepted by `ext_key_usages`/`reject_extension` to their
/// OIDs. Unknown names are a configuration error, not a silent no-op.
fn parse_ekus(names: &[String]) -> eyre::Result<Vec<ObjectIdentifier>> {
    names.iter().map(|name| parse_eku(name)).collect()
}

fn parse_eku(name: &str) -> eyre::Result<ObjectIdentifier> {
    Ok(match name {
        "ServerAuth" => rfc5280::ID_KP_SERVER_AUTH,
        "ClientAuth" => rfc5280::ID_KP_CLIENT_AUTH,
        "CodeSigning" => rfc5280::ID_KP_CODE_SIGNING,
        "EmailProtection" => rfc5280::ID_KP_EMAIL_PROTECTION,
        "TimeStamping" => rfc5280::ID_KP_TIME_STAMPING,
        "OcspSigning" => rfc5280::ID_KP_OCSP_SIGNING,
        other => eyre::bail!("unknown extended key usage: {other}"),
    })
}

/// Parses the `reject_extension` block-list: arbitrary dotted-decimal
/// extension OIDs, not limited to the six named EKUs `parse_ekus` knows.
fn parse_oids(oids: &[String]) -> eyre::Result<Vec<ObjectIdentifier>> {
    oids.iter()
        .map(|oid| {
            oid.parse()
                .map_err(|_| eyre::eyre!("invalid extension OID: {oid}"))
        })
        .collect()
}

fn parse_rfc3339(input: &str) -> eyre::Result<i64> {
    Ok(chrono::DateTime::parse_from_rfc3339(input)?.timestamp())
}

/// Parses sizes with an optional SI/binary suffix (`1Mi`, `64k`, `128`).
fn parse_si_size(input: &str) -> eyre::Result<usize> {
    let (digits, multiplier) = match input {
        s if s.ends_with("Ki") => (&s[..s.len() - 2], 1024),
        s if s.ends_with("Mi") => (&s[..s.len() - 2], 1024 * 1024),
        s if s.ends_with("Gi") => (&s[..s.len() - 2], 1024 * 1024 * 1024),
        s if s.ends_with('k') => (&s[..s.len() - 1], 1_000),
        s if s.ends_with('M') => (&s[..s.len() - 1], 1_000_000),
        s if s.ends_with('G') => (&s[..s.len() - 1], 1_000_000_000),
        s => (s, 1),
    };

    let value: usize = digits
        .parse()
        .map_err(|_| eyre::eyre!("invalid size: {input}"))?;
    Ok(value * multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_binary_and_decimal_suffixes() {
        assert_eq!(parse_si_size("128").unwrap(), 128);
        assert_eq!(parse_si_size("64k").unwrap(), 64_000);
        assert_eq!(parse_si_size("1Mi").unwrap(), 1 << 20);
    }

    #[test]
    fn rejects_unknown_eku_names() {
        assert!(parse_eku("TimeStomping").is_err());
    }

    #[test]
    fn parses_arbitrary_extension_oids() {
        let oids = parse_oids(&["2.5.29.17".to_string()]).unwrap();
        assert_eq!(oids, vec!["2.5.29.17".parse::<ObjectIdentifier>().unwrap()]);
    }

    #[test]
    fn rejects_malformed_extension_oid() {
        assert!(parse_oids(&["not-an-oid".to_string()]).is_err());
    }
}
