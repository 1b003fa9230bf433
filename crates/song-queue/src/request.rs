//! Song request records and the media assets they own.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::AssetReleaseError;

/// Lifecycle state of a song request.
///
/// `Pending -> Fetching -> Ready -> Playing`, with `Failed` reached only by a
/// request that is being dropped after its fetch failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Pending,
    Fetching,
    Ready,
    Playing,
    Failed,
}

impl RequestState {
    /// True while the fetch for this request has not completed.
    pub fn is_awaiting_fetch(self) -> bool {
        matches!(self, RequestState::Pending | RequestState::Fetching)
    }
}

/// Downloaded media on local disk.
///
/// The asset is owned by exactly one request. The file is removed by
/// [`MediaAsset::release`], or when the asset is dropped without being released.
#[derive(Debug)]
pub struct MediaAsset {
    path: PathBuf,
    released: bool,
}

impl MediaAsset {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            released: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the backing file. A file that is already gone counts as released.
    pub fn release(mut self) -> Result<(), AssetReleaseError> {
        self.released = true;
        remove_asset_file(&self.path)
    }
}

impl Drop for MediaAsset {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = remove_asset_file(&self.path) {
            tracing::warn!(path = ?e.path, error = %e.source, "dropped asset could not be removed");
        }
    }
}

fn remove_asset_file(path: &Path) -> Result<(), AssetReleaseError> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::info!(path = ?path, "deleted audio file");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(AssetReleaseError {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// A single song requested by a chat user.
#[derive(Debug)]
pub struct SongRequest {
    url: String,
    requester: String,
    state: RequestState,
    asset: Option<MediaAsset>,
    enqueued_at: Instant,
}

impl SongRequest {
    pub(crate) fn new(url: String, requester: String) -> Self {
        Self {
            url,
            requester,
            state: RequestState::Pending,
            asset: None,
            enqueued_at: Instant::now(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn requester(&self) -> &str {
        &self.requester
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn asset(&self) -> Option<&MediaAsset> {
        self.asset.as_ref()
    }

    pub fn enqueued_at(&self) -> Instant {
        self.enqueued_at
    }

    /// Detach the asset so the caller can release it.
    pub fn take_asset(&mut self) -> Option<MediaAsset> {
        self.asset.take()
    }

    pub(crate) fn set_state(&mut self, state: RequestState) {
        self.state = state;
    }

    pub(crate) fn attach_asset(&mut self, asset: MediaAsset) {
        self.asset = Some(asset);
        self.state = RequestState::Ready;
    }

    pub(crate) fn entry(&self, position: usize) -> QueueEntry {
        QueueEntry {
            position,
            url: self.url.clone(),
            requester: self.requester.clone(),
            state: self.state,
            waited: self.enqueued_at.elapsed(),
        }
    }
}

/// Read-only view of a queued request, used for status reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    /// 1-based position in the queue.
    pub position: usize,
    pub url: String,
    pub requester: String,
    pub state: RequestState,
    /// Time since the request was accepted.
    pub waited: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(tag: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "song-queue-{tag}-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::write(&path, b"stub").expect("write temp file");
        path
    }

    #[test]
    fn release_removes_backing_file() {
        let path = temp_file("release");
        let asset = MediaAsset::new(&path);
        asset.release().expect("release");
        assert!(!path.exists());
    }

    #[test]
    fn release_of_missing_file_is_ok() {
        let asset = MediaAsset::new("/nonexistent/song-queue/missing.mp3");
        assert!(asset.release().is_ok());
    }

    #[test]
    fn dropping_unreleased_asset_removes_file() {
        let path = temp_file("drop");
        drop(MediaAsset::new(&path));
        assert!(!path.exists());
    }

    #[test]
    fn release_of_directory_reports_error() {
        let dir = std::env::temp_dir().join(format!(
            "song-queue-dir-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("create dir");
        let err = MediaAsset::new(&dir).release().unwrap_err();
        assert_eq!(err.path, dir);
        std::fs::remove_dir(&dir).expect("cleanup dir");
    }

    #[test]
    fn new_request_starts_pending_without_asset() {
        let request = SongRequest::new("https://youtu.be/a".into(), "alice".into());
        assert_eq!(request.state(), RequestState::Pending);
        assert!(request.asset().is_none());
        assert!(request.state().is_awaiting_fetch());
    }
}
