// Content identity module
// Streams a byte source through a hash function and produces the token
// used to decide whether a file and an object hold the same bytes

use std::fmt;
use std::path::Path;

use md5::{Digest as Md5Digest, Md5};
use serde::{Deserialize, Serialize};
use sha2::{Digest as Sha2Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Result, SyncError};
use crate::fs::FileSystem;

/// Read buffer used while hashing (1MB)
const HASH_BUFFER_SIZE: usize = 1024 * 1024;

/// Trait for hash algorithm implementations
pub trait Hasher: Send {
    /// Update the hasher with new data
    fn update(&mut self, data: &[u8]);

    /// Finalize the hash and return the result
    fn finalize(self: Box<Self>) -> Vec<u8>;
}

// MD5 wrapper
pub struct Md5Wrapper(Md5);

impl Hasher for Md5Wrapper {
    fn update(&mut self, data: &[u8]) {
        Md5Digest::update(&mut self.0, data);
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        Md5Digest::finalize(self.0).to_vec()
    }
}

// SHA-256 wrapper
pub struct Sha256Wrapper(Sha256);

impl Hasher for Sha256Wrapper {
    fn update(&mut self, data: &[u8]) {
        Sha2Digest::update(&mut self.0, data);
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        Sha2Digest::finalize(self.0).to_vec()
    }
}

/// Hash algorithm backing a content identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// MD5, matching the ETag S3 reports for single-part uploads.
    #[default]
    Md5,
    Sha256,
}

impl HashAlgorithm {
    pub fn hasher(self) -> Box<dyn Hasher> {
        match self {
            HashAlgorithm::Md5 => Box::new(Md5Wrapper(Md5Digest::new())),
            HashAlgorithm::Sha256 => Box::new(Sha256Wrapper(Sha2Digest::new())),
        }
    }

    /// Digest length in bytes
    pub fn output_size(self) -> usize {
        match self {
            HashAlgorithm::Md5 => 16,
            HashAlgorithm::Sha256 => 32,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha256 => "sha256",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a store derives the identity it reports for an object.
///
/// With a part size, bodies longer than one part are uploaded in parts of
/// exactly that size and the store reports the digest of the concatenated
/// part digests followed by `-<parts>`. Anything up to one part reports the
/// plain digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IdentityScheme {
    pub algorithm: HashAlgorithm,
    pub part_size: Option<usize>,
}

impl IdentityScheme {
    pub fn multipart(algorithm: HashAlgorithm, part_size: usize) -> Self {
        Self {
            algorithm,
            part_size: Some(part_size.max(1)),
        }
    }
}

impl From<HashAlgorithm> for IdentityScheme {
    fn from(algorithm: HashAlgorithm) -> Self {
        Self {
            algorithm,
            part_size: None,
        }
    }
}

/// Change-detection token for a file or object.
///
/// Two identities are equal only when both the algorithm and the hex value
/// match. Values reported by a store go through [`ContentIdentity::from_reported`]
/// so quoting artifacts never cause a spurious mismatch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentIdentity {
    algorithm: HashAlgorithm,
    value: String,
}

impl ContentIdentity {
    pub fn from_digest(algorithm: HashAlgorithm, digest: &[u8]) -> Self {
        Self {
            algorithm,
            value: bytes_to_hex(digest),
        }
    }

    /// Build an identity from a value reported by a store (an ETag).
    ///
    /// Surrounding quotes and a weak-validator `W/` prefix are removed and
    /// the value is lowercased. Anything that is not a plain digest (e.g. a
    /// multipart ETag like `abc...-3`) is kept verbatim and will never equal
    /// a computed identity.
    pub fn from_reported(algorithm: HashAlgorithm, raw: &str) -> Self {
        let trimmed = raw.trim();
        let trimmed = trimmed.strip_prefix("W/").unwrap_or(trimmed);
        let value = trimmed.trim_matches('"').to_ascii_lowercase();
        Self { algorithm, value }
    }

    /// Identity of a body hashed part by part.
    ///
    /// Zero or one part gives the plain digest; more parts give the digest
    /// of the concatenated part digests with a `-<parts>` suffix.
    pub fn from_parts(algorithm: HashAlgorithm, part_digests: &[Vec<u8>]) -> Self {
        match part_digests {
            [] => Self::from_digest(algorithm, &algorithm.hasher().finalize()),
            [single] => Self::from_digest(algorithm, single),
            parts => {
                let mut hasher = algorithm.hasher();
                for digest in parts {
                    hasher.update(digest);
                }
                Self {
                    algorithm,
                    value: format!("{}-{}", bytes_to_hex(&hasher.finalize()), parts.len()),
                }
            }
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Hex-encoded value
    pub fn as_hex(&self) -> &str {
        &self.value
    }

    /// Whether the value looks like a full digest of its algorithm
    pub fn is_plain_digest(&self) -> bool {
        self.value.len() == self.algorithm.output_size() * 2
            && self.value.bytes().all(|b| b.is_ascii_hexdigit())
    }
}

impl fmt::Display for ContentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.value)
    }
}

/// Incremental hashing that cuts the input into fixed-size parts
struct PartHasher {
    algorithm: HashAlgorithm,
    part_size: usize,
    current: Box<dyn Hasher>,
    filled: usize,
    digests: Vec<Vec<u8>>,
}

impl PartHasher {
    fn new(scheme: IdentityScheme) -> Self {
        Self {
            algorithm: scheme.algorithm,
            part_size: scheme.part_size.filter(|&n| n > 0).unwrap_or(usize::MAX),
            current: scheme.algorithm.hasher(),
            filled: 0,
            digests: Vec::new(),
        }
    }

    fn update(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            let take = data.len().min(self.part_size - self.filled);
            self.current.update(&data[..take]);
            self.filled += take;
            data = &data[take..];
            if self.filled == self.part_size {
                self.cut();
            }
        }
    }

    fn cut(&mut self) {
        let done = std::mem::replace(&mut self.current, self.algorithm.hasher());
        self.digests.push(done.finalize());
        self.filled = 0;
    }

    fn finish(mut self) -> ContentIdentity {
        if self.filled > 0 {
            self.cut();
        }
        ContentIdentity::from_parts(self.algorithm, &self.digests)
    }
}

/// Hash an async byte stream to the end.
///
/// The stream is consumed once through a fixed buffer; `label` only feeds
/// the error context.
pub async fn compute<R>(
    reader: &mut R,
    scheme: impl Into<IdentityScheme>,
    label: &Path,
) -> Result<ContentIdentity>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut hasher = PartHasher::new(scheme.into());
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];

    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .await
            .map_err(|e| SyncError::io(e, "hashing", label))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finish())
}

/// Open `path` through the file system capability and hash it.
pub async fn compute_file(
    fs: &dyn FileSystem,
    path: &Path,
    scheme: impl Into<IdentityScheme>,
) -> Result<ContentIdentity> {
    let mut reader = fs
        .open_read(path)
        .await
        .map_err(|e| SyncError::io(e, "opening", path))?;
    compute(&mut reader, scheme, path).await
}

/// Hash an in-memory buffer
pub fn compute_bytes(data: &[u8], scheme: impl Into<IdentityScheme>) -> ContentIdentity {
    let mut hasher = PartHasher::new(scheme.into());
    hasher.update(data);
    hasher.finish()
}

/// Convert bytes to hexadecimal string
fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
