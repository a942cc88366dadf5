use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;
use crate::fs::types::ListPage;
use crate::hash::{HashAlgorithm, IdentityScheme};

/// Backend type information for display and identification
#[derive(Debug, Clone, PartialEq)]
pub enum BackendType {
    S3 {
        bucket: String,
        region: String,
        endpoint: Option<String>,
    },
    Memory,
}

impl BackendType {
    /// Get a short display name for the backend
    pub fn short_name(&self) -> &'static str {
        match self {
            BackendType::S3 { .. } => "S3",
            BackendType::Memory => "Memory",
        }
    }
}

/// Object store capability consumed by a sync run.
///
/// A store is bound to one bucket at construction; keys never carry a
/// leading separator.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    // ========== Listing ==========

    /// Fetch one page of keys under `prefix`, continuing after `continuation`
    async fn list(&self, prefix: &str, continuation: Option<&str>) -> Result<ListPage>;

    // ========== Object Transfer ==========

    /// Stream `body` into the object at `key`, returning the bytes written
    async fn put(&self, key: &str, body: &mut (dyn AsyncRead + Send + Unpin)) -> Result<u64>;

    /// Stream the object at `key` into `sink`, returning the bytes read
    async fn get(&self, key: &str, sink: &mut (dyn AsyncWrite + Send + Unpin)) -> Result<u64>;

    /// Remove the object at `key`
    async fn delete(&self, key: &str) -> Result<()>;

    // ========== Backend Info ==========

    /// Algorithm behind the identities this store reports in listings
    fn identity_algorithm(&self) -> HashAlgorithm {
        HashAlgorithm::Md5
    }

    /// Part size of multipart uploads; bodies up to this size go in one request
    fn multipart_part_size(&self) -> Option<usize> {
        None
    }

    /// Scheme a local file must be hashed with to compare against listings
    fn identity_scheme(&self) -> IdentityScheme {
        IdentityScheme {
            algorithm: self.identity_algorithm(),
            part_size: self.multipart_part_size(),
        }
    }

    /// Get the backend type
    fn backend_type(&self) -> BackendType;

    /// Get display path for a key
    fn display_key(&self, key: &str) -> String {
        key.to_string()
    }
}
