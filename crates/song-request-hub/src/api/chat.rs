//! Chat relay endpoint.

use actix_web::{post, web, HttpResponse, Responder};

use crate::chat::{handle_chat_event, ChatEvent, ChatReply};
use crate::models::ChatResponse;
use crate::state::AppState;

#[utoipa::path(
    post,
    path = "/chat",
    request_body = ChatEvent,
    responses(
        (status = 200, description = "Event handled; reply is null unless it was a song request", body = ChatResponse)
    )
)]
#[post("/chat")]
/// Handle one chat event and return the reply to post back.
pub async fn chat_event(state: web::Data<AppState>, body: web::Json<ChatEvent>) -> impl Responder {
    let reply = handle_chat_event(&state.orchestrator, &body).map(ChatReply::new);
    HttpResponse::Ok().json(ChatResponse { reply })
}
