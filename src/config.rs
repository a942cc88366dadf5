//! Run configuration.
//!
//! Push and pull runs are each described by one YAML file. Keys are
//! PascalCase; the store section is shared:
//!
//! ```yaml
//! Region: ap-northeast-2
//! AccessKeyID: AKIA...
//! SecretKey: ...
//! EndPoint: https://objects.example.com
//! Bucket: backups
//! ObjectRoot: nightly/db
//! UploadPaths: [/srv/data]
//! ExcludeTags: [.git, node_modules]
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{Result, SyncError};
use crate::fs::s3::{S3Settings, DEFAULT_PAGE_SIZE};
use crate::hash;
use crate::sync::{ExcludeDirs, PullTarget, PushTarget, SyncOptions, DEFAULT_CONCURRENCY};

/// Store connection and run tuning keys common to both directions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StoreConfig {
    #[serde(default)]
    pub region: String,
    #[serde(rename = "AccessKeyID", default)]
    pub access_key_id: String,
    #[serde(default)]
    pub secret_key: String,
    /// Custom endpoint; empty means the provider default
    #[serde(rename = "EndPoint", default)]
    pub endpoint: String,
    #[serde(default)]
    pub bucket: String,
    /// Key prefix all objects live under
    #[serde(default)]
    pub object_root: String,

    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub dry_run: bool,
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

impl StoreConfig {
    /// Connection settings for the S3 adapter
    pub fn s3_settings(&self) -> S3Settings {
        let endpoint = self.endpoint.trim();
        S3Settings {
            region: self.region.clone(),
            access_key_id: self.access_key_id.clone(),
            secret_key: self.secret_key.clone(),
            endpoint: (!endpoint.is_empty()).then(|| endpoint.to_string()),
            bucket: self.bucket.clone(),
            page_size: self.page_size,
        }
    }

    /// Object root without leading, trailing or doubled separators
    pub fn object_root(&self) -> String {
        hash::normalize_object_root(&self.object_root)
    }

    fn validate(&self) -> Result<()> {
        if self.bucket.trim().is_empty() {
            return Err(SyncError::config("Bucket is required"));
        }
        if self.region.trim().is_empty() {
            return Err(SyncError::config("Region is required"));
        }
        if self.concurrency == 0 {
            return Err(SyncError::config("Concurrency must be greater than 0"));
        }
        if self.page_size == 0 || self.page_size > DEFAULT_PAGE_SIZE {
            return Err(SyncError::config(format!(
                "PageSize must be between 1 and {DEFAULT_PAGE_SIZE}, got {}",
                self.page_size
            )));
        }
        Ok(())
    }
}

/// Configuration of a push run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PushConfig {
    #[serde(flatten)]
    pub store: StoreConfig,
    #[serde(default)]
    pub upload_paths: Vec<PathBuf>,
    /// Directory names skipped at any depth
    #[serde(default)]
    pub exclude_tags: Vec<String>,
    /// Abort when a plan would delete more objects than this
    #[serde(default)]
    pub max_deletes: Option<usize>,
}

impl PushConfig {
    /// Read and validate a push configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| SyncError::io(e, "reading config", path))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: PushConfig =
            serde_yaml::from_str(content).map_err(|e| SyncError::config(format!("invalid push config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        self.store.validate()?;
        if self.upload_paths.is_empty() {
            return Err(SyncError::config("UploadPaths must list at least one directory"));
        }
        // Surfaces bad glob patterns at load time
        ExcludeDirs::from_patterns(self.exclude_tags.as_slice())?;
        Ok(())
    }

    pub fn target(&self) -> Result<PushTarget> {
        Ok(PushTarget {
            upload_roots: self.upload_paths.clone(),
            exclude: ExcludeDirs::from_patterns(self.exclude_tags.as_slice())?,
            object_root: self.store.object_root(),
        })
    }

    pub fn options(&self) -> SyncOptions {
        SyncOptions {
            concurrency: self.store.concurrency,
            dry_run: self.store.dry_run,
            max_deletes: self.max_deletes,
        }
    }
}

/// Configuration of a pull run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PullConfig {
    #[serde(flatten)]
    pub store: StoreConfig,
    #[serde(default)]
    pub download_path: Option<PathBuf>,
}

impl PullConfig {
    /// Read and validate a pull configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| SyncError::io(e, "reading config", path))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: PullConfig =
            serde_yaml::from_str(content).map_err(|e| SyncError::config(format!("invalid pull config: {e}")))?;
        config.store.validate()?;
        Ok(config)
    }

    /// Directory downloads land in.
    ///
    /// A missing or non-directory `DownloadPath` falls back to the current
    /// working directory.
    pub fn resolve_download_root(&self) -> Result<PathBuf> {
        if let Some(path) = self.download_path.as_ref().filter(|p| !p.as_os_str().is_empty()) {
            if path.is_dir() {
                return Ok(path.clone());
            }
            warn!(path = %path.display(), "download path does not exist, using the current directory");
        }
        std::env::current_dir().map_err(|e| SyncError::io(e, "resolving", "current directory"))
    }

    pub fn target(&self) -> Result<PullTarget> {
        Ok(PullTarget {
            download_root: self.resolve_download_root()?,
            object_root: self.store.object_root(),
        })
    }

    pub fn options(&self) -> SyncOptions {
        SyncOptions {
            concurrency: self.store.concurrency,
            dry_run: self.store.dry_run,
            max_deletes: None,
        }
    }
}
