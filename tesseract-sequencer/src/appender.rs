use std::{
    future::Future,
    pin::Pin,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    task::{Context, Poll},
    time::Duration,
};

use tesseract_core::{
    Entry, LeafData,
    store::{IndexedStore, Store},
    tiling::{DataTile, DataTileId, Tile, TileId},
    tree::{NodeKey, Tree, TreeHead},
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::dedupe::Dedupe;

/// Tunables governing batching and pushback for the appender (C4).
#[derive(Debug, Clone)]
pub struct AppenderConfig {
    pub batch_max_size: usize,
    pub batch_max_age: Duration,
    pub checkpoint_interval: Duration,
    pub pushback_max_outstanding: usize,
}

impl Default for AppenderConfig {
    fn default() -> Self {
        Self {
            batch_max_size: 256,
            batch_max_age: Duration::from_millis(500),
            checkpoint_interval: Duration::from_secs(1),
            pushback_max_outstanding: 1 << 16,
        }
    }
}

/// What [`Appender::add`] resolves to once the entry has been sequenced
/// (not necessarily integrated into a published checkpoint yet -- that is
/// the publication awaiter's (C6) job).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssignResult {
    pub index: u64,
    pub is_duplicate: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppendError {
    #[error("the appender was dropped before resolving this entry")]
    Cancelled,
}

/// A future resolving to the index an [`Entry`] was (or previously was)
/// assigned.
pub struct IndexFuture(async_oneshot::Receiver<AssignResult>);

impl Future for IndexFuture {
    type Output = Result<AssignResult, AppendError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0)
            .poll(cx)
            .map(|result| result.map_err(|_| AppendError::Cancelled))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PushbackError {
    #[error("too many outstanding entries ({outstanding}) awaiting sequencing")]
    TooManyOutstanding { outstanding: usize },
}

struct Pending {
    leaf: LeafData,
    sender: async_oneshot::Sender<AssignResult>,
}

/// Batches entries and sequences them into the Merkle tree (C4).
///
/// Entries are held in `pending` until `batch_max_size` is reached or the
/// background integrator's tick fires, then written to the tree as a
/// single batch -- the tree itself only ever sees whole-batch writes, so
/// its frontier bookkeeping stays cheap under load.
pub struct Appender<N, L> {
    tree: Tree<N, L, LeafData>,
    dedupe: Dedupe,
    pending: Mutex<Vec<Pending>>,
    outstanding: AtomicUsize,
    config: AppenderConfig,
}

impl<N, L> Appender<N, L>
where
    N: Store<NodeKey, tesseract_core::tree::HashOutput>,
    L: IndexedStore<LeafData>,
{
    pub fn new(tree: Tree<N, L, LeafData>, dedupe_capacity: usize, config: AppenderConfig) -> Self {
        Self {
            tree,
            dedupe: Dedupe::new(dedupe_capacity),
            pending: Mutex::new(vec![]),
            outstanding: AtomicUsize::new(0),
            config,
        }
    }

    pub fn tree_head(&self) -> TreeHead {
        self.tree.recompute_tree_head()
    }

    /// Builds the hash tile `id`, reading the subtree hashes it is made of
    /// from the sequenced tree. Used by [`crate::TilePublisher`].
    pub fn build_hash_tile(&self, id: &TileId) -> Option<Tile> {
        self.tree.build_hash_tile(id)
    }

    /// Builds the entry bundle `id`, reading the sequenced leaves it
    /// covers. Used by [`crate::TilePublisher`].
    pub fn build_data_tile(&self, id: &DataTileId) -> Option<DataTile> {
        self.tree.build_data_tile(id)
    }

    /// Submits `entry` for sequencing. If an identical entry (by canonical
    /// bytes) was already sequenced and is still tracked by the dedupe
    /// table, resolves immediately with the previously-assigned index and
    /// `is_duplicate: true` instead of appending a new leaf.
    pub fn add(&self, entry: Entry, timestamp: u64) -> Result<IndexFuture, PushbackError> {
        let outstanding = self.outstanding.load(Ordering::SeqCst);
        if outstanding >= self.config.pushback_max_outstanding {
            tracing::warn!(outstanding, "pushback: too many entries awaiting sequencing");
            return Err(PushbackError::TooManyOutstanding { outstanding });
        }

        let (mut sender, receiver) = async_oneshot::oneshot();

        if let Some(index) = self.dedupe.lookup(&entry) {
            let _ = sender.send(AssignResult {
                index,
                is_duplicate: true,
            });
            return Ok(IndexFuture(receiver));
        }

        self.outstanding.fetch_add(1, Ordering::SeqCst);

        let should_flush = {
            let mut pending = self.pending.lock().unwrap();
            pending.push(Pending {
                leaf: LeafData { timestamp, entry },
                sender,
            });
            pending.len() >= self.config.batch_max_size
        };

        if should_flush {
            self.flush();
        }

        Ok(IndexFuture(receiver))
    }

    /// Sequences every currently-pending entry into the tree. Called by the
    /// background integrator on its tick, and directly whenever a batch
    /// fills up.
    pub fn flush(&self) {
        let batch = std::mem::take(&mut *self.pending.lock().unwrap());
        if batch.is_empty() {
            return;
        }

        tracing::debug!(batch_size = batch.len(), "flushing sequencer batch");

        for Pending { leaf, mut sender } in batch {
            let index = self.tree.insert_entry(leaf.clone());
            self.dedupe.record(&leaf.entry, index);
            self.outstanding.fetch_sub(1, Ordering::SeqCst);
            let _ = sender.send(AssignResult {
                index,
                is_duplicate: false,
            });
        }
    }

    /// Runs the background integrator: flushes on every `batch_max_age`
    /// tick until `cancel` fires, then flushes once more so no pending
    /// entry is stranded on shutdown.
    pub async fn run_integrator(&self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("integrator shutting down, flushing pending batch");
                    self.flush();
                    return;
                }
                _ = tokio::time::sleep(self.config.batch_max_age) => {
                    tracing::debug!("integrator tick");
                    self.flush();
                }
            }
        }
    }
}
