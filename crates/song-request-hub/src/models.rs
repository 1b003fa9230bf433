//! API models and OpenAPI schemas.
//!
//! Defines request/response structures for the hub server API.

use serde::{Deserialize, Serialize};
use song_queue::{NowPlaying, QueueEntry, RequestState};
use utoipa::ToSchema;

use crate::chat::ChatReply;

/// Response for the `/chat` endpoint.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ChatResponse {
    /// Message to post back to the chat, if the event was a song request.
    pub reply: Option<ChatReply>,
}

/// Request payload for the `/queue` endpoint.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct QueueAddRequest {
    /// Media URL to fetch and play.
    pub url: String,
    /// User who asked for the song.
    pub requester: String,
}

/// Position of a request in the queue (1-based).
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct QueuePositionResponse {
    pub position: usize,
}

/// Query for the `/queue/position` endpoint.
#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct QueuePositionQuery {
    pub url: String,
}

/// Error body for rejected requests.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct QueueRejectedResponse {
    /// `capacity_exceeded` or `duplicate_request`.
    pub error: String,
    /// Human-readable reason, suitable for a chat reply.
    pub message: String,
}

/// A queued request.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct QueueItem {
    /// 1-based position in play order.
    pub position: usize,
    pub url: String,
    pub requester: String,
    pub state: RequestState,
    /// Milliseconds since the request was accepted.
    pub waited_ms: u64,
}

impl From<QueueEntry> for QueueItem {
    fn from(entry: QueueEntry) -> Self {
        Self {
            position: entry.position,
            url: entry.url,
            requester: entry.requester,
            state: entry.state,
            waited_ms: entry.waited.as_millis() as u64,
        }
    }
}

/// Queue listing response.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct QueueResponse {
    pub items: Vec<QueueItem>,
    /// Maximum number of queued requests.
    pub capacity: usize,
}

/// The request currently holding the playback slot.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct NowPlayingInfo {
    pub url: String,
    pub requester: String,
    /// Milliseconds since playback started.
    pub elapsed_ms: u64,
}

impl From<NowPlaying> for NowPlayingInfo {
    fn from(now: NowPlaying) -> Self {
        Self {
            url: now.url,
            requester: now.requester,
            elapsed_ms: now.started_at.elapsed().as_millis() as u64,
        }
    }
}

/// Overall hub status.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct StatusResponse {
    pub now_playing: Option<NowPlayingInfo>,
    pub queue_len: usize,
    pub queue_capacity: usize,
    /// Downloads still running.
    pub fetches_in_flight: usize,
    /// True while the playback advancer thread is running.
    pub advancing: bool,
}

/// Response for the `/playback/skip` endpoint.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct SkipResponse {
    pub skipped: bool,
}
