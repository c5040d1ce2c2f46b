//! Object storage for source archives and extractor artifacts

use anyhow::Result;
use async_trait::async_trait;

pub mod config;
pub mod fs;
pub mod memory;
pub mod s3;

pub use config::{ObjectStoreKind, StorageConfig};
pub use fs::FsObjectStore;
pub use memory::InMemoryObjectStore;
pub use s3::Storage;

/// Minimal blob contract the pipeline needs
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: Option<&str>) -> Result<()>;

    /// `None` when the key does not exist
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Keys under `prefix`, sorted
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Map a source location such as `s3://bucket/a.mbox` onto a key of this store
    fn key_for_location(&self, location: &str) -> String {
        strip_scheme(location).to_string()
    }
}

/// Drop a leading `scheme://` if present
pub fn strip_scheme(location: &str) -> &str {
    match location.split_once("://") {
        Some((scheme, rest)) if !scheme.is_empty() && !scheme.contains('/') => rest,
        _ => location,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_scheme() {
        assert_eq!(strip_scheme("mem://archives/a.mbox"), "archives/a.mbox");
        assert_eq!(strip_scheme("archives/a.mbox"), "archives/a.mbox");
        assert_eq!(strip_scheme("dir/x://y"), "dir/x://y");
    }
}
