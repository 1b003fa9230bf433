//! Playback status and control handlers.

use actix_web::{get, post, web, HttpResponse, Responder};

use crate::models::{NowPlayingInfo, SkipResponse, StatusResponse};
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/status",
    responses(
        (status = 200, description = "Now playing and queue summary", body = StatusResponse)
    )
)]
#[get("/status")]
/// Report the now-playing slot and queue counters.
pub async fn status(state: web::Data<AppState>) -> impl Responder {
    let queue = state.queue();
    HttpResponse::Ok().json(StatusResponse {
        now_playing: state.advancer.slot().current().map(NowPlayingInfo::from),
        queue_len: queue.len(),
        queue_capacity: queue.capacity(),
        fetches_in_flight: state.orchestrator.in_flight(),
        advancing: state.advancer.is_running(),
    })
}

#[utoipa::path(
    post,
    path = "/playback/skip",
    responses(
        (status = 200, description = "Skip signalled", body = SkipResponse)
    )
)]
#[post("/playback/skip")]
/// End the current song early.
pub async fn skip(state: web::Data<AppState>) -> impl Responder {
    let skipped = state.advancer.skip();
    if skipped {
        tracing::info!("skip requested");
    }
    HttpResponse::Ok().json(SkipResponse { skipped })
}
