//! HTTP API handlers.
//!
//! Defines the Actix routes for chat ingress, the request queue, and playback status.

pub mod chat;
pub mod health;
pub mod playback;
pub mod queue;

pub use chat::chat_event;
pub use health::HealthResponse;
pub use playback::{skip, status};
pub use queue::{queue_add, queue_list, queue_position};
