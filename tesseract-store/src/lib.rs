//! Storage backends for the log. [`tesseract_core::store::MemoryStore`] is
//! re-exported for non-durable deployments (tests, single-shot CLI runs);
//! [`FilesystemStore`] persists one file per key for the STH/SCT
//! antispam/bookkeeping stores that need to survive a restart without a
//! database.

#[cfg(feature = "filesystem")]
mod file;
#[cfg(feature = "filesystem")]
pub use file::FilesystemStore;

#[cfg(feature = "filesystem")]
mod tile;
#[cfg(feature = "filesystem")]
pub use tile::FilesystemTileStore;

pub use tesseract_core::store::MemoryStore;

pub trait StringStoreKey: Clone + Ord + Send + Sync + 'static {
    fn serialize_key(&self) -> String;
    fn deserialize_key(key: &str) -> Option<Self>;
}

pub trait StringStoreValue: Clone + Send + Sync + 'static {
    fn serialize_value(&self) -> String;
    fn deserialize_value(value: &str) -> Option<Self>;
}

impl StringStoreKey for u64 {
    fn serialize_key(&self) -> String {
        self.to_string()
    }

    fn deserialize_key(key: &str) -> Option<Self> {
        key.parse().ok()
    }
}

impl StringStoreKey for [u8; 32] {
    fn serialize_key(&self) -> String {
        hex::encode(self)
    }

    fn deserialize_key(key: &str) -> Option<Self> {
        hex::decode(key).ok()?.try_into().ok()
    }
}

#[cfg(feature = "filesystem")]
impl StringStoreValue for tesseract_core::tiling::Checkpoint {
    fn serialize_value(&self) -> String {
        self.as_string()
    }

    fn deserialize_value(value: &str) -> Option<Self> {
        Self::parse_checkpoint(value).ok()
    }
}

#[cfg(feature = "filesystem")]
impl StringStoreValue for tesseract_core::Sct {
    fn serialize_value(&self) -> String {
        serde_json::to_string(self).expect("Sct serialization never fails")
    }

    fn deserialize_value(value: &str) -> Option<Self> {
        serde_json::from_str(value).ok()
    }
}
