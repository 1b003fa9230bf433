//! Shared application state.
//!
//! One queue instance is shared by the fetch orchestrator and the playback advancer.

use song_queue::{FetchOrchestrator, PlaybackAdvancer, RequestQueue};

pub struct AppState {
    /// Admits requests and runs their fetches.
    pub orchestrator: FetchOrchestrator,
    /// Owns the now-playing slot.
    pub advancer: PlaybackAdvancer,
}

impl AppState {
    pub fn new(orchestrator: FetchOrchestrator, advancer: PlaybackAdvancer) -> Self {
        Self {
            orchestrator,
            advancer,
        }
    }

    pub fn queue(&self) -> &RequestQueue {
        self.orchestrator.queue()
    }
}
