//! Song request queue manager.
//!
//! Chat viewers request songs by URL; requests land in a bounded, deduplicated
//! [`queue::RequestQueue`], media for each request is fetched in the background by the
//! [`fetch::FetchOrchestrator`], and the [`advancer::PlaybackAdvancer`] moves ready
//! requests through a single "now playing" slot.
//!
//! ## Flow
//! 1. **Enqueue**: the ingress side calls [`fetch::FetchOrchestrator::enqueue`].
//! 2. **Fetch**: one worker thread per request runs a [`fetch::MediaFetcher`].
//! 3. **Advance**: the advancer thread takes the first ready request, holds the slot for
//!    the configured duration, then retires it and releases its asset.

pub mod advancer;
pub mod config;
pub mod error;
pub mod fetch;
pub mod queue;
pub mod request;

pub use advancer::{NowPlaying, PlaybackAdvancer, PlaybackSlot};
pub use config::QueueConfig;
pub use error::{AssetReleaseError, FetchError, QueueError};
pub use fetch::{FetchOrchestrator, MediaFetcher};
pub use queue::RequestQueue;
pub use request::{MediaAsset, QueueEntry, RequestState, SongRequest};
