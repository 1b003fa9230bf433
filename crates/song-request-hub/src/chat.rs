//! Chat ingress: turns chat events into song requests and queue results into replies.

use serde::{Deserialize, Serialize};
use song_queue::{FetchOrchestrator, QueueError};
use utoipa::ToSchema;

const CHAT_MESSAGE: &str = "chat_message";

/// Inbound chat event as relayed from the stream chat.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ChatEvent {
    /// Event type; only `chat_message` events are handled.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Message text.
    #[serde(default)]
    pub message: String,
    /// Chat user name.
    #[serde(default)]
    pub user: Option<String>,
}

/// Outbound chat message to post back to the stream chat.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ChatReply {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

impl ChatReply {
    pub fn new(message: String) -> Self {
        Self {
            kind: CHAT_MESSAGE.to_string(),
            message,
        }
    }
}

/// True when a chat message is a YouTube link.
pub fn is_song_request(message: &str) -> bool {
    message.starts_with("http")
        && (message.contains("youtube.com/watch") || message.contains("youtu.be/"))
}

pub fn accepted_reply(user: &str, position: usize) -> String {
    format!("@{user} Song added to queue! Position: {position}")
}

pub fn rejected_reply(user: &str, err: &QueueError) -> String {
    format!("@{user} {err}")
}

/// Handle one chat event. Returns the reply to post, or `None` when the event is not a
/// song request.
pub fn handle_chat_event(orchestrator: &FetchOrchestrator, event: &ChatEvent) -> Option<String> {
    if event.kind != CHAT_MESSAGE {
        return None;
    }
    let message = event.message.trim();
    let user = event.user.as_deref().unwrap_or("Unknown");
    tracing::info!(user, message, "chat message");

    if !is_song_request(message) {
        return None;
    }
    let reply = match orchestrator.enqueue(message, user) {
        Ok(position) => accepted_reply(user, position),
        Err(err) => {
            tracing::info!(user, url = message, reason = %err, "song request rejected");
            rejected_reply(user, &err)
        }
    };
    Some(reply)
}
