use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tesseract_core::{LeafData, store::Store, tree::TreeHead};
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Splits a global leaf index into its entry-bundle coordinates
/// (`bundle_idx`, `entry_idx`), per the static-CT-API tiling layout (256
/// leaves per bundle). Used by duplicate-timestamp recovery to describe
/// which bundle a remote reader would need to fetch; the in-process
/// awaiter below reads the leaf store directly instead; recovery reads it.
pub fn bundle_coordinates(index: u64) -> (u64, u64) {
    (index / 256, index % 256)
}

/// Publishes the current [`TreeHead`] on a fixed interval, driving every
/// waiter from a single ticker rather than one sleep loop per in-flight
/// await -- the design note this crate follows is "don't spawn a task per
/// pending future", not "poll over the network every 200ms", since the
/// awaiter and the appender share the same process here.
pub struct CheckpointPublisher {
    tx: watch::Sender<TreeHead>,
    interval: Duration,
}

impl CheckpointPublisher {
    pub fn new(initial: TreeHead, interval: Duration) -> (Self, watch::Receiver<TreeHead>) {
        let (tx, rx) = watch::channel(initial);
        (Self { tx, interval }, rx)
    }

    pub async fn run(&self, recompute: impl Fn() -> TreeHead, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("checkpoint publisher shutting down, publishing final head");
                    let _ = self.tx.send(recompute());
                    return;
                }
                _ = tokio::time::sleep(self.interval) => {
                    let head = recompute();
                    tracing::debug!(tree_size = head.tree_size, "publishing tree head");
                    let _ = self.tx.send(head);
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AwaitError {
    #[error("the checkpoint publisher was dropped")]
    SourceClosed,

    #[error("too many duplicate-timestamp recoveries in flight ({in_flight})")]
    Pushback { in_flight: usize },

    #[error("entry at index {index} was not found in the leaf store during recovery")]
    EntryMissing { index: u64 },
}

/// Waits for a sequenced leaf to be covered by a published checkpoint
/// (C6), and recovers the original sequencing timestamp of a duplicate
/// entry so the caller can reissue the same SCT it was first given.
pub struct PublicationAwaiter<L> {
    head_rx: watch::Receiver<TreeHead>,
    leafs: L,
    pushback_max_dedupe_in_flight: usize,
    dedupe_in_flight: AtomicUsize,
}

impl<L: Store<u64, LeafData>> PublicationAwaiter<L> {
    pub fn new(head_rx: watch::Receiver<TreeHead>, leafs: L, pushback_max_dedupe_in_flight: usize) -> Self {
        Self {
            head_rx,
            leafs,
            pushback_max_dedupe_in_flight,
            dedupe_in_flight: AtomicUsize::new(0),
        }
    }

    /// Resolves once `index` is covered by a published tree (`tree_size >
    /// index`).
    pub async fn await_publication(&self, index: u64) -> Result<(), AwaitError> {
        let mut rx = self.head_rx.clone();

        if rx.borrow().tree_size > index {
            return Ok(());
        }

        loop {
            rx.changed().await.map_err(|_| AwaitError::SourceClosed)?;
            if rx.borrow().tree_size > index {
                return Ok(());
            }
        }
    }

    /// Recovers the sequencing timestamp originally assigned to the entry
    /// at `index`, for the case where a resubmission was deduplicated
    /// against it. Bounded by `pushback_max_dedupe_in_flight`, reset every
    /// second by the caller's background ticker (see
    /// [`reset_dedupe_in_flight_ticker`]).
    pub async fn recover_duplicate_timestamp(&self, index: u64) -> Result<u64, AwaitError> {
        let in_flight = self.dedupe_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        if in_flight > self.pushback_max_dedupe_in_flight {
            self.dedupe_in_flight.fetch_sub(1, Ordering::SeqCst);
            tracing::warn!(in_flight, "pushback: too many duplicate-timestamp recoveries in flight");
            return Err(AwaitError::Pushback { in_flight });
        }

        let leaf = self.leafs.get(&index);
        self.dedupe_in_flight.fetch_sub(1, Ordering::SeqCst);

        leaf.map(|leaf| leaf.timestamp).ok_or_else(|| {
            tracing::warn!(index, "entry missing from leaf store during duplicate recovery");
            AwaitError::EntryMissing { index }
        })
    }

    pub fn dedupe_in_flight_reset(&self) {
        self.dedupe_in_flight.store(0, Ordering::SeqCst);
    }
}

/// Runs a ticker that resets the dedupe-in-flight counter every second,
/// per Design Note "coroutine control flow": a pushback threshold that
/// never recovers after a burst would wedge the log, so the counter is
/// periodically zeroed rather than strictly decremented on completion
/// alone.
pub async fn reset_dedupe_in_flight_ticker<L: Store<u64, LeafData>>(
    awaiter: &PublicationAwaiter<L>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(Duration::from_secs(1)) => {
                awaiter.dedupe_in_flight_reset();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tesseract_core::{Entry, EntryType, store::MemoryStore};

    #[test]
    fn bundle_coordinates_split_on_256() {
        assert_eq!(bundle_coordinates(0), (0, 0));
        assert_eq!(bundle_coordinates(255), (0, 255));
        assert_eq!(bundle_coordinates(256), (1, 0));
        assert_eq!(bundle_coordinates(69950), (273, 62));
    }

    #[tokio::test]
    async fn await_publication_resolves_once_tree_size_covers_index() {
        let (tx, rx) = watch::channel(TreeHead {
            tree_size: 0,
            head: [0u8; 32],
        });
        let awaiter = PublicationAwaiter::new(rx, MemoryStore::<u64, LeafData>::default(), 16);

        tx.send(TreeHead {
            tree_size: 5,
            head: [1u8; 32],
        })
        .unwrap();

        awaiter.await_publication(3).await.unwrap();
    }

    #[tokio::test]
    async fn recover_duplicate_timestamp_reads_leaf_store() {
        let (_tx, rx) = watch::channel(TreeHead {
            tree_size: 1,
            head: [0u8; 32],
        });
        let leafs = MemoryStore::<u64, LeafData>::default();
        leafs.insert(
            0,
            LeafData {
                timestamp: 12345,
                entry: Entry {
                    entry_type: EntryType::X509,
                    cert_der: vec![1],
                    precertificate: vec![],
                    issuer_key_hash: [0u8; 32],
                    fingerprints_chain: vec![],
                },
            },
        );

        let awaiter = PublicationAwaiter::new(rx, leafs, 16);
        let timestamp = awaiter.recover_duplicate_timestamp(0).await.unwrap();
        assert_eq!(timestamp, 12345);
    }

    #[tokio::test]
    async fn pushback_triggers_once_in_flight_limit_is_reached() {
        let (_tx, rx) = watch::channel(TreeHead {
            tree_size: 1,
            head: [0u8; 32],
        });
        let leafs = MemoryStore::<u64, LeafData>::default();
        let awaiter = PublicationAwaiter::new(rx, leafs, 0);
        assert!(matches!(
            awaiter.recover_duplicate_timestamp(0).await,
            Err(AwaitError::Pushback { .. })
        ));
    }
}
