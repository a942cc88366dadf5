use anyhow::Context;
use async_trait::async_trait;
use futures::TryStreamExt;
use opendal::{services::S3, Operator};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::{Result, SyncError};
use crate::fs::store::{BackendType, ObjectStore};
use crate::fs::types::{ListPage, ObjectEntry};

/// Objects per listing page, the S3 ListObjectsV2 maximum
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Part size of uploads.
///
/// Bodies up to one part go out as a single PutObject and report the plain
/// MD5 as their ETag. Larger bodies are split into parts of exactly this
/// size, so their multipart ETag can be reproduced locally.
pub const PUT_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Connection settings for an S3-compatible store
#[derive(Debug, Clone, Default)]
pub struct S3Settings {
    pub region: String,
    pub access_key_id: String,
    pub secret_key: String,
    /// Custom endpoint for non-AWS stores; `None` uses the AWS default
    pub endpoint: Option<String>,
    pub bucket: String,
    pub page_size: usize,
}

/// S3 and S3-compatible storage backend using OpenDAL
pub struct S3Store {
    operator: Operator,
    bucket: String,
    region: String,
    endpoint: Option<String>,
    page_size: usize,
}

impl S3Store {
    /// Create a new S3-compatible backend with explicit credentials.
    ///
    /// Requests use path-style addressing so custom endpoints work without
    /// per-bucket DNS.
    pub fn new(settings: &S3Settings) -> Result<Self> {
        let mut builder = S3::default()
            .root("/")
            .bucket(&settings.bucket)
            .region(&settings.region)
            .access_key_id(&settings.access_key_id)
            .secret_access_key(&settings.secret_key);

        // Set custom endpoint for S3-compatible providers
        if let Some(endpoint) = settings.endpoint.as_deref() {
            builder = builder.endpoint(endpoint);
        }

        let operator = Operator::new(builder)
            .map_err(|e| SyncError::config(format!("cannot build S3 client: {}", e)))?
            .finish();

        Ok(Self {
            operator,
            bucket: settings.bucket.clone(),
            region: settings.region.clone(),
            endpoint: settings.endpoint.clone(),
            page_size: if settings.page_size == 0 {
                DEFAULT_PAGE_SIZE
            } else {
                settings.page_size
            },
        })
    }

    async fn list_page(&self, prefix: &str, start_after: Option<&str>) -> anyhow::Result<ListPage> {
        let path = if prefix.is_empty() || prefix == "/" {
            String::new()
        } else {
            format!("{}/", prefix.trim_matches('/'))
        };

        let mut lister = match start_after {
            Some(token) => self
                .operator
                .lister_with(&path)
                .recursive(true)
                .start_after(token)
                .await,
            None => self.operator.lister_with(&path).recursive(true).await,
        }
        .context("Failed to start S3 listing")?;

        let mut entries = Vec::new();
        while let Some(entry) = lister.try_next().await.context("Failed to read S3 listing")? {
            let meta = entry.metadata();
            if meta.mode().is_dir() {
                continue;
            }

            // A full page means the caller needs another round trip
            if entries.len() == self.page_size {
                let next_token = entries.last().map(|e: &ObjectEntry| e.key.clone());
                return Ok(ListPage {
                    entries,
                    next_token,
                    is_truncated: true,
                });
            }

            entries.push(ObjectEntry {
                key: entry.path().to_string(),
                etag: meta.etag().map(str::to_string),
                size: meta.content_length(),
            });
        }

        Ok(ListPage::last(entries))
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list(&self, prefix: &str, continuation: Option<&str>) -> Result<ListPage> {
        let mut page = self
            .list_page(prefix, continuation)
            .await
            .map_err(|e| SyncError::List {
                prefix: prefix.to_string(),
                message: format!("{:#}", e),
            })?;

        // Listings do not always carry ETags; fall back to a stat per object
        for entry in page.entries.iter_mut().filter(|e| e.etag.is_none()) {
            let meta = self.operator.stat(&entry.key).await.map_err(|e| SyncError::List {
                prefix: prefix.to_string(),
                message: format!("stat {}: {}", entry.key, e),
            })?;
            entry.etag = meta.etag().map(str::to_string);
        }

        debug!(
            prefix,
            objects = page.entries.len(),
            truncated = page.is_truncated,
            "listed S3 page"
        );
        Ok(page)
    }

    async fn put(&self, key: &str, body: &mut (dyn AsyncRead + Send + Unpin)) -> Result<u64> {
        let mut writer = self
            .operator
            .writer_with(key)
            .chunk(PUT_CHUNK_SIZE)
            .await
            .map_err(|e| SyncError::transfer(key, e))?;

        let mut total = 0u64;
        loop {
            let chunk = read_chunk(body, PUT_CHUNK_SIZE)
                .await
                .map_err(|e| SyncError::io(e, "reading upload body for", key))?;
            if chunk.is_empty() {
                break;
            }
            total += chunk.len() as u64;
            writer.write(chunk).await.map_err(|e| SyncError::transfer(key, e))?;
        }

        writer.close().await.map_err(|e| SyncError::transfer(key, e))?;
        Ok(total)
    }

    async fn get(&self, key: &str, sink: &mut (dyn AsyncWrite + Send + Unpin)) -> Result<u64> {
        let reader = self
            .operator
            .reader(key)
            .await
            .map_err(|e| SyncError::transfer(key, e))?;
        let mut stream = reader
            .into_bytes_stream(..)
            .await
            .map_err(|e| SyncError::transfer(key, e))?;

        let mut total = 0u64;
        while let Some(bytes) = stream
            .try_next()
            .await
            .map_err(|e| SyncError::transfer(key, e))?
        {
            sink.write_all(&bytes)
                .await
                .map_err(|e| SyncError::io(e, "writing download of", key))?;
            total += bytes.len() as u64;
        }
        sink.flush()
            .await
            .map_err(|e| SyncError::io(e, "flushing download of", key))?;

        Ok(total)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.operator
            .delete(key)
            .await
            .map_err(|e| SyncError::transfer(key, e))
    }

    fn multipart_part_size(&self) -> Option<usize> {
        Some(PUT_CHUNK_SIZE)
    }

    fn backend_type(&self) -> BackendType {
        BackendType::S3 {
            bucket: self.bucket.clone(),
            region: self.region.clone(),
            endpoint: self.endpoint.clone(),
        }
    }

    fn display_key(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key.trim_start_matches('/'))
    }
}

/// Fill up to `limit` bytes from `body`, returning fewer only at end of stream
async fn read_chunk(body: &mut (dyn AsyncRead + Send + Unpin), limit: usize) -> std::io::Result<Vec<u8>> {
    let mut chunk = vec![0u8; limit];
    let mut filled = 0;
    while filled < limit {
        let n = body.read(&mut chunk[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    chunk.truncate(filled);
    Ok(chunk)
}
