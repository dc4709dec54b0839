use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tesseract_core::{
    LeafData,
    store::{IndexedStore, Store},
    tiling::{DataTileId, TileId},
    tree::{HashOutput, NodeKey, Tree, TreeHead},
};
use tesseract_store::FilesystemTileStore;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::Appender;

/// The number of entries an entry bundle or hash tile holds.
const TILE_WIDTH: u64 = 256;

/// Watches the published tree head and writes entry bundles and hash tiles
/// for every boundary it crosses (C4's tile/bundle contract), the same way
/// [`crate::CheckpointPublisher`] watches it to publish checkpoints. Only
/// ever writes tiles that have become newly available since the last
/// publish, plus the current partial tile at each level so readers can see
/// progress before it fills.
pub struct TilePublisher<N, L> {
    appender: Arc<Appender<N, L>>,
    tiles: FilesystemTileStore,
    head_rx: watch::Receiver<TreeHead>,
    last_published_size: AtomicU64,
}

impl<N, L> TilePublisher<N, L>
where
    N: Store<NodeKey, HashOutput>,
    L: IndexedStore<LeafData>,
{
    pub fn new(appender: Arc<Appender<N, L>>, tiles: FilesystemTileStore, head_rx: watch::Receiver<TreeHead>) -> Self {
        Self {
            appender,
            tiles,
            head_rx,
            last_published_size: AtomicU64::new(0),
        }
    }

    pub async fn run(&self, cancel: CancellationToken) {
        let mut rx = self.head_rx.clone();

        loop {
            let tree_size = rx.borrow_and_update().tree_size;
            self.publish(tree_size).await;

            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("tile publisher shutting down, writing final tiles");
                    let tree_size = rx.borrow().tree_size;
                    self.publish(tree_size).await;
                    return;
                }
                changed = rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }
    }

    async fn publish(&self, tree_size: u64) {
        let last_size = self.last_published_size.load(Ordering::SeqCst);
        if tree_size == last_size {
            return;
        }

        self.publish_data_tiles(last_size, tree_size).await;
        self.publish_hash_tiles(last_size, tree_size).await;

        self.last_published_size.store(tree_size, Ordering::SeqCst);
    }

    async fn publish_data_tiles(&self, last_size: u64, tree_size: u64) {
        let last_full = last_size / TILE_WIDTH;
        let now_full = tree_size / TILE_WIDTH;

        for idx in last_full..now_full {
            self.write_data_tile(idx * TILE_WIDTH, tree_size).await;
        }

        if tree_size % TILE_WIDTH != 0 {
            self.write_data_tile(now_full * TILE_WIDTH, tree_size).await;
        }
    }

    async fn write_data_tile(&self, first_leaf: u64, tree_size: u64) {
        let Some(id) = DataTileId::from_index(first_leaf, tree_size) else {
            return;
        };
        if let Some(tile) = self.appender.build_data_tile(&id) {
            self.tiles.write_data_tile(&tile).await;
        }
    }

    /// Tree sizes fit in a u64, and `256^8 == 2^64`, so no tile above level
    /// 7 can ever exist; the loop is naturally bounded without needing to
    /// track how many levels the tree currently has.
    async fn publish_hash_tiles(&self, last_size: u64, tree_size: u64) {
        for level in 0u8..=7 {
            let Some(entry_size) = 256u64.checked_pow(level as u32) else {
                break;
            };
            if entry_size > tree_size {
                break;
            }
            let Some(tile_width_leaves) = entry_size.checked_mul(TILE_WIDTH) else {
                break;
            };

            let last_full = last_size / tile_width_leaves;
            let now_full = tree_size / tile_width_leaves;

            for idx in last_full..now_full {
                self.write_hash_tile(idx * tile_width_leaves, tile_width_leaves, tree_size).await;
            }

            if tree_size % tile_width_leaves != 0 {
                self.write_hash_tile(now_full * tile_width_leaves, tile_width_leaves, tree_size)
                    .await;
            }
        }
    }

    async fn write_hash_tile(&self, tile_start: u64, tile_width_leaves: u64, tree_size: u64) {
        let key = NodeKey::range(tile_start, tile_start + tile_width_leaves);
        let Some(id) = TileId::from_node_key(&key, tree_size) else {
            return;
        };
        if let Some(tile) = self.appender.build_hash_tile(&id) {
            self.tiles.write_hash_tile(&tile).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AppenderConfig;
    use tesseract_core::{Entry, EntryType, store::MemoryStore};

    fn entry(tag: u8) -> Entry {
        Entry {
            entry_type: EntryType::X509,
            cert_der: vec![tag],
            precertificate: vec![],
            issuer_key_hash: [0u8; 32],
            fingerprints_chain: vec![],
        }
    }

    #[tokio::test]
    async fn publishes_a_full_data_tile_and_level_zero_hash_tile() {
        let dir = tempdir::TempDir::new("tesseract-tiler-test").unwrap();
        let tiles = FilesystemTileStore::new(dir.path().to_path_buf());

        let tree = Tree::new(MemoryStore::default(), MemoryStore::default());
        let appender = Arc::new(Appender::new(
            tree,
            1024,
            AppenderConfig {
                batch_max_size: 256,
                ..Default::default()
            },
        ));

        for i in 0..256u8 {
            appender.add(entry(i), i as u64).unwrap();
        }
        appender.flush();

        let (_tx, rx) = watch::channel(appender.tree_head());
        let publisher = TilePublisher::new(appender, tiles, rx);
        publisher.publish(256).await;

        let data_id = DataTileId::from_index(0, 256).unwrap();
        let data_path = dir.path().join(data_id.as_url());
        assert!(tokio::fs::try_exists(&data_path).await.unwrap());

        let key = NodeKey::range(0, 256);
        let hash_id = TileId::from_node_key(&key, 256).unwrap();
        let hash_path = dir.path().join(hash_id.as_url());
        let hash_data = tokio::fs::read(&hash_path).await.unwrap();
        assert_eq!(hash_data.len(), 256 * 32);
    }

    #[tokio::test]
    async fn publishes_a_partial_data_tile() {
        let dir = tempdir::TempDir::new("tesseract-tiler-test").unwrap();
        let tiles = FilesystemTileStore::new(dir.path().to_path_buf());

        let tree = Tree::new(MemoryStore::default(), MemoryStore::default());
        let appender = Arc::new(Appender::new(tree, 1024, AppenderConfig::default()));

        for i in 0..10u8 {
            appender.add(entry(i), i as u64).unwrap();
        }
        appender.flush();

        let (_tx, rx) = watch::channel(appender.tree_head());
        let publisher = TilePublisher::new(appender, tiles, rx);
        publisher.publish(10).await;

        let data_id = DataTileId::from_index(0, 10).unwrap();
        let data_path = dir.path().join(data_id.as_url());
        assert!(tokio::fs::try_exists(&data_path).await.unwrap());
    }
}
