//! Sequencing pipeline for the log: the batched appender (C4), the
//! antispam/dedupe table it consults (C5), the publication awaiter (C6)
//! that lets a caller block until a sequenced entry is covered by a
//! published checkpoint or recover the timestamp of an earlier duplicate,
//! and the tile publisher that writes C4's entry bundles and hash tiles
//! as the tree grows.

mod appender;
mod awaiter;
mod dedupe;
mod tiler;

pub use appender::{AppendError, Appender, AppenderConfig, AssignResult, IndexFuture, PushbackError};
pub use awaiter::{AwaitError, CheckpointPublisher, PublicationAwaiter, bundle_coordinates, reset_dedupe_in_flight_ticker};
pub use dedupe::Dedupe;
pub use tiler::TilePublisher;
