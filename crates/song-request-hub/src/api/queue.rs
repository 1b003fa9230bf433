//! Queue-related API handlers.

use actix_web::{get, post, web, HttpResponse, Responder};
use song_queue::QueueError;

use crate::models::{
    QueueAddRequest,
    QueueItem,
    QueuePositionQuery,
    QueuePositionResponse,
    QueueRejectedResponse,
    QueueResponse,
};
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/queue",
    responses(
        (status = 200, description = "Queue contents in play order", body = QueueResponse)
    )
)]
#[get("/queue")]
/// Return the current queue.
pub async fn queue_list(state: web::Data<AppState>) -> impl Responder {
    let queue = state.queue();
    let items = queue.snapshot().into_iter().map(QueueItem::from).collect();
    HttpResponse::Ok().json(QueueResponse {
        items,
        capacity: queue.capacity(),
    })
}

#[utoipa::path(
    post,
    path = "/queue",
    request_body = QueueAddRequest,
    responses(
        (status = 200, description = "Request accepted", body = QueuePositionResponse),
        (status = 409, description = "URL already queued", body = QueueRejectedResponse),
        (status = 503, description = "Queue is full", body = QueueRejectedResponse)
    )
)]
#[post("/queue")]
/// Queue a URL and start fetching it.
pub async fn queue_add(state: web::Data<AppState>, body: web::Json<QueueAddRequest>) -> impl Responder {
    let url = body.url.trim();
    if url.is_empty() {
        return HttpResponse::BadRequest().body("url is required");
    }
    match state.orchestrator.enqueue(url, body.requester.trim()) {
        Ok(position) => HttpResponse::Ok().json(QueuePositionResponse { position }),
        Err(err) => rejected(&err),
    }
}

#[utoipa::path(
    get,
    path = "/queue/position",
    params(
        ("url" = String, Query, description = "Requested URL")
    ),
    responses(
        (status = 200, description = "Current position", body = QueuePositionResponse),
        (status = 404, description = "URL not queued")
    )
)]
#[get("/queue/position")]
/// Look up the position of a queued URL.
pub async fn queue_position(
    state: web::Data<AppState>,
    query: web::Query<QueuePositionQuery>,
) -> impl Responder {
    match state.queue().position_of(&query.url) {
        Some(position) => HttpResponse::Ok().json(QueuePositionResponse { position }),
        None => HttpResponse::NotFound().finish(),
    }
}

fn rejected(err: &QueueError) -> HttpResponse {
    let (mut builder, code) = match err {
        QueueError::CapacityExceeded { .. } => {
            (HttpResponse::ServiceUnavailable(), "capacity_exceeded")
        }
        QueueError::DuplicateRequest { .. } => (HttpResponse::Conflict(), "duplicate_request"),
    };
    builder.json(QueueRejectedResponse {
        error: code.to_string(),
        message: err.to_string(),
    })
}
