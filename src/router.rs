// src/router.rs

use crate::{handlers, state::AppState, websocket};
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Builds the relay's router:
/// - `POST /room` create a room from a grid
/// - `GET /join-room?room_id=..` websocket join
/// - `GET /room/{id}` snapshot and members
/// - `DELETE /room/{id}` remove a room
/// - `GET /room/{id}/record` persisted metadata
///
/// Any origin is allowed; editors are served from a separate frontend host.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/room", post(handlers::create_room))
        .route("/join-room", get(websocket::join_room_handler))
        .route(
            "/room/{id}",
            get(handlers::get_room).delete(handlers::delete_room),
        )
        .route("/room/{id}/record", get(handlers::get_room_record))
        .fallback(handlers::not_found)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
