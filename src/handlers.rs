// src/handlers.rs

//! JSON routes around the room registry. The join route lives in
//! `websocket.rs`.

use crate::{
    database::RoomRecord,
    error::AppError,
    models::{ApiResponse, CreateRoomRequest, RoomId, RoomView},
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{info, warn};

/// `POST /room`: validates the grid, opens a live room and records it.
/// Responds with the new room id.
pub async fn create_room(
    State(state): State<AppState>,
    payload: Result<Json<CreateRoomRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<RoomId>>, AppError> {
    let Json(payload) =
        payload.map_err(|_| AppError::Invalid("Invalid JSON body".to_string()))?;
    let new_room = payload.validate()?;

    let room = state
        .registry
        .create_room(new_room.snapshot.headers, new_room.snapshot.rows)
        .await?;

    if let Err(e) = state
        .store
        .create_room(room.id(), &new_room.filename, "")
        .await
    {
        // A room nobody can find in the store should not stay live.
        if let Err(remove_err) = state.registry.remove_room(room.id()).await {
            warn!(room_id = %room.id(), error = %remove_err, "rollback of unpersisted room failed");
        }
        return Err(e);
    }

    info!(room_id = %room.id(), filename = %new_room.filename, "room ready");
    Ok(Json(ApiResponse::data(room.id())))
}

/// `GET /room/{id}`: the creation snapshot plus who is connected.
pub async fn get_room(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<RoomView>>, AppError> {
    let room = state.registry.get_room(RoomId::parse(&id)?).await?;
    let members = room.members().await?;
    let snapshot = room.snapshot();

    Ok(Json(ApiResponse::data(RoomView {
        id: room.id(),
        headers: snapshot.headers.clone(),
        rows: snapshot.rows.clone(),
        members,
    })))
}

/// `DELETE /room/{id}`: unregisters the room and disconnects its members.
pub async fn delete_room(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    state.registry.remove_room(RoomId::parse(&id)?).await?;
    Ok(Json(ApiResponse::message("Room removed")))
}

/// `GET /room/{id}/record`: persisted metadata for a room.
pub async fn get_room_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<RoomRecord>>, AppError> {
    let record = state.store.get_room_by_room_id(RoomId::parse(&id)?).await?;
    Ok(Json(ApiResponse::data(record)))
}

pub async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "404 - Not Found")
}
