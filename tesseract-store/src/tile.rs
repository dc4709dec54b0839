use std::path::PathBuf;
use tesseract_core::tiling::{DataTile, Tile};
use tracing::warn;

/// Persists hash tiles and entry-bundle data tiles under a base directory,
/// at the relative path each tile's `as_url()` describes
/// (c2sp.org/static-ct-api/tlog-tiles). Serving these files over HTTP is
/// outside this process; this only keeps them on disk next to the
/// published checkpoint.
#[derive(Debug, Clone)]
pub struct FilesystemTileStore {
    root: PathBuf,
}

impl FilesystemTileStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub async fn write_hash_tile(&self, tile: &Tile) {
        self.write(tile.id().as_url(), tile.data()).await;
    }

    pub async fn write_data_tile(&self, tile: &DataTile) {
        self.write(tile.id().as_url(), tile.data()).await;
    }

    async fn write(&self, relative: String, data: &[u8]) {
        let path = self.root.join(relative);
        let Some(parent) = path.parent() else {
            return;
        };

        if let Err(err) = tokio::fs::create_dir_all(parent).await {
            warn!(?err, dir = %parent.display(), "failed to create tile directory");
            return;
        }

        if let Err(err) = tokio::fs::write(&path, data).await {
            warn!(?err, path = %path.display(), "failed to write tile");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tesseract_core::tiling::{DataTileId, TileId};
    use tesseract_core::tree::NodeKey;

    #[tokio::test]
    async fn writes_hash_tile_at_its_url() {
        let dir = tempdir::TempDir::new("tesseract-tile-test").unwrap();
        let store = FilesystemTileStore::new(dir.path().to_path_buf());

        let key = NodeKey::range(0, 256);
        let id = TileId::from_node_key(&key, 256).unwrap();
        let tile = Tile::from_hashes(id.clone(), &[[7u8; 32]; 256]);

        store.write_hash_tile(&tile).await;

        let written = tokio::fs::read(dir.path().join(id.as_url())).await.unwrap();
        assert_eq!(written.len(), 256 * 32);
    }

    #[tokio::test]
    async fn writes_data_tile_at_its_url() {
        let dir = tempdir::TempDir::new("tesseract-tile-test").unwrap();
        let store = FilesystemTileStore::new(dir.path().to_path_buf());

        let id = DataTileId::from_index(0, 1).unwrap();
        let tile = DataTile::from_entries(id.clone(), &[]);

        store.write_data_tile(&tile).await;

        assert!(tokio::fs::try_exists(dir.path().join(id.as_url())).await.unwrap());
    }
}
