//! Error types for queue admission, media fetches and asset release.

use std::path::PathBuf;

/// Reasons a request is refused at admission. Both are recoverable: the caller
/// tells the user and they may try again later.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("Queue is full! Please try again later.")]
    CapacityExceeded { capacity: usize },

    #[error("This song is already in the queue!")]
    DuplicateRequest { url: String },
}

/// Failure reported by a media fetcher. Never surfaced to the requester; the
/// request is dropped from the queue instead.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("fetch produced no usable asset")]
    NoAsset,

    #[error("fetch failed: {0}")]
    Failed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failure deleting a downloaded asset during retirement. Logged and swallowed.
#[derive(Debug, thiserror::Error)]
#[error("release asset {path:?}")]
pub struct AssetReleaseError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}
