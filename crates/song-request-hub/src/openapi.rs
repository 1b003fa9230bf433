use utoipa::OpenApi;

use crate::api;
use crate::chat;
use crate::models;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::chat::chat_event,
        api::queue::queue_list,
        api::queue::queue_add,
        api::queue::queue_position,
        api::playback::status,
        api::playback::skip,
        api::health::health,
    ),
    components(
        schemas(
            chat::ChatEvent,
            chat::ChatReply,
            models::ChatResponse,
            models::QueueAddRequest,
            models::QueuePositionResponse,
            models::QueueRejectedResponse,
            models::QueueItem,
            models::QueueResponse,
            models::NowPlayingInfo,
            models::StatusResponse,
            models::SkipResponse,
            song_queue::RequestState,
            api::HealthResponse,
        )
    ),
    tags(
        (name = "song-request-hub", description = "Song request queue API")
    )
)]
pub struct ApiDoc;
