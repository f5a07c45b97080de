// src/models.rs

use crate::error::AppError;
use axum::{
    body::Bytes,
    extract::ws::{Message, Utf8Bytes},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque identifier of a live room. Generated by the registry, never reused
/// while the room is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(Uuid);

impl RoomId {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Parses a room id received from a client.
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        Uuid::parse_str(raw.trim())
            .map(Self)
            .map_err(|_| AppError::Invalid(format!("invalid room id: {raw}")))
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identity of one duplex connection. Membership is keyed by this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The table a room was created from. Captured once; relayed patches are
/// never applied to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSnapshot {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl GridSnapshot {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }
}

/// A relayed payload. The hub never looks inside it, only the message kind
/// is preserved so binary patches stay binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(Utf8Bytes),
    Binary(Bytes),
}

impl Frame {
    /// Extracts a relayable frame from a websocket message. Control frames
    /// yield `None`.
    pub fn from_message(message: Message) -> Option<Self> {
        match message {
            Message::Text(text) => Some(Frame::Text(text)),
            Message::Binary(data) => Some(Frame::Binary(data)),
            Message::Ping(_) | Message::Pong(_) | Message::Close(_) => None,
        }
    }

    pub fn into_message(self) -> Message {
        match self {
            Frame::Text(text) => Message::Text(text),
            Frame::Binary(data) => Message::Binary(data),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Frame::Text(text) => text.as_str().len(),
            Frame::Binary(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<&'static str> for Frame {
    fn from(text: &'static str) -> Self {
        Frame::Text(Utf8Bytes::from_static(text))
    }
}

/// Read-only view of one room member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberInfo {
    pub connection_id: ConnectionId,
    pub participant: Option<String>,
}

/// Body of `POST /room`. Every field is optional here so that missing fields
/// surface as our own validation error rather than a deserializer rejection.
#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub headers: Option<Vec<String>>,
    pub rows: Option<Vec<Vec<String>>>,
    pub filename: Option<String>,
}

/// A validated room-creation request.
#[derive(Debug, Clone)]
pub struct NewRoom {
    pub snapshot: GridSnapshot,
    pub filename: String,
}

impl CreateRoomRequest {
    pub fn validate(self) -> Result<NewRoom, AppError> {
        let (Some(headers), Some(rows)) = (self.headers, self.rows) else {
            return Err(AppError::Invalid("Failed schema validation".to_string()));
        };
        let filename = match self.filename {
            Some(name) if !name.trim().is_empty() => name,
            _ => return Err(AppError::Invalid("Failed schema validation".to_string())),
        };
        Ok(NewRoom {
            snapshot: GridSnapshot::new(headers, rows),
            filename,
        })
    }
}

/// Query string of `GET /join-room`.
#[derive(Debug, Deserialize)]
pub struct JoinRoomQuery {
    pub room_id: String,
    pub participant: Option<String>,
}

/// Snapshot plus live membership, returned by `GET /room/{id}`.
#[derive(Debug, Serialize)]
pub struct RoomView {
    pub id: RoomId,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub members: Vec<MemberInfo>,
}

/// Success envelope shared by every JSON route.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn data(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: None,
        }
    }
}
