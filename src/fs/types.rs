use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};

/// Boxed byte source handed out by a [`crate::fs::FileSystem`]
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Boxed byte sink handed out by a [`crate::fs::FileSystem`]
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One object as reported by a store listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectEntry {
    /// Full key, without a leading separator
    pub key: String,
    /// Identity value exactly as the store reported it (may be quoted)
    pub etag: Option<String>,
    pub size: u64,
}

impl ObjectEntry {
    /// Keys ending in `/` are directory markers, not content
    pub fn is_dir_marker(&self) -> bool {
        self.key.ends_with('/')
    }

    pub fn format_size(&self) -> String {
        humansize::format_size(self.size, humansize::BINARY)
    }
}

/// One page of a paginated listing
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub entries: Vec<ObjectEntry>,
    /// Token to pass to the next `list` call
    pub next_token: Option<String>,
    /// More pages follow
    pub is_truncated: bool,
}

impl ListPage {
    /// A page with nothing after it
    pub fn last(entries: Vec<ObjectEntry>) -> Self {
        Self {
            entries,
            next_token: None,
            is_truncated: false,
        }
    }
}
