use crate::tiling::index_to_url;
use crate::tree::{HashOutput, NodeKey};
use std::num::NonZeroU8;

const TILE_HEIGHT: u32 = 8;
const TILE_WIDTH: u64 = 1 << TILE_HEIGHT;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileId {
    level: u8,
    index: u64,
    partial: Option<NonZeroU8>,
}

impl TileId {
    /// Returns the [`TileId`] of the hash tile that contains `key`, a node
    /// sitting at a tile-level boundary (`key.size()` a power of 256), or
    /// `None` if `key` does not sit on such a boundary.
    ///
    /// `tree_size` is the number of leaves currently in the tree, used to
    /// determine whether the tile is full or partial.
    pub fn from_node_key(key: &NodeKey, tree_size: u64) -> Option<Self> {
        let size = key.size();
        if !size.is_power_of_two() {
            return None;
        }

        let height = size.trailing_zeros();
        if height % TILE_HEIGHT != 0 {
            return None;
        }
        let level: u8 = (height / TILE_HEIGHT).try_into().ok()?;

        if key.start % size != 0 {
            return None;
        }
        let node_index = key.start / size;
        let tile_index = node_index / TILE_WIDTH;

        let level_width = tree_size.div_ceil(size);
        let tile_end = (tile_index + 1) * TILE_WIDTH;
        let partial = if tile_end <= level_width {
            None
        } else {
            let partial: u8 = (level_width % TILE_WIDTH).try_into().unwrap();
            Some(NonZeroU8::new(partial).unwrap())
        };

        Some(Self {
            level,
            index: tile_index,
            partial,
        })
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    /// Number of hash entries this tile holds (`TILE_WIDTH` unless partial).
    pub fn width(&self) -> u64 {
        self.partial.map_or(TILE_WIDTH, |partial| partial.get() as u64)
    }

    pub fn as_url(&self) -> String {
        let index_url = index_to_url(self.index);
        let level = self.level;

        match self.partial {
            Some(partial) => format!("tile/{level}/{index_url}.p/{partial}"),
            None => format!("tile/{level}/{index_url}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    id: TileId,
    data: Vec<u8>,
}

impl Tile {
    /// Builds a hash tile from its constituent entry hashes, in order.
    pub fn from_hashes(id: TileId, hashes: &[HashOutput]) -> Self {
        let mut data = Vec::with_capacity(hashes.len() * 32);
        for hash in hashes {
            data.extend_from_slice(hash);
        }
        Self { id, data }
    }

    pub fn id(&self) -> &TileId {
        &self.id
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tile_id(level: u8, index: u64, partial: Option<u8>) -> TileId {
        TileId {
            level,
            index,
            partial: partial.map(|p| NonZeroU8::new(p).unwrap()),
        }
    }

    #[test]
    fn as_url() {
        assert_eq!(&tile_id(0, 1, None).as_url(), "tile/0/001");
        assert_eq!(&tile_id(1, 1234, Some(128)).as_url(), "tile/1/x001/234.p/128");
    }

    #[test]
    fn level_zero_tile_index_and_partial() {
        // node covering leaves [256, 512) is tile (level=0, index=1)
        let key = NodeKey {
            start: 256,
            end: 512,
        };
        assert_eq!(
            TileId::from_node_key(&key, 70_000).unwrap(),
            tile_id(0, 1, None)
        );

        // node covering leaves [69888, 70144) would be a full tile, but the
        // tree only has 70_000 leaves, so it is partial with width 112.
        let key = NodeKey {
            start: 69888,
            end: 70144,
        };
        assert_eq!(
            TileId::from_node_key(&key, 70_000).unwrap(),
            tile_id(0, 273, Some(112))
        );
    }

    #[test]
    fn level_one_tile_covers_65536_leaves() {
        let key = NodeKey {
            start: 65536,
            end: 131072,
        };
        assert_eq!(
            TileId::from_node_key(&key, 200_000).unwrap(),
            tile_id(1, 1, None)
        );
    }

    #[test]
    fn non_boundary_key_is_rejected() {
        let key = NodeKey { start: 3, end: 5 };
        assert!(TileId::from_node_key(&key, 70_000).is_none());
    }
}
