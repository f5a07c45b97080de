// src/websocket.rs

use crate::{
    config::ConnectionSettings,
    error::AppError,
    models::{ConnectionId, Frame, JoinRoomQuery, RoomId},
    room::{Mailbox, Room},
    state::AppState,
};
use axum::{
    extract::{
        Query, State, WebSocketUpgrade,
        rejection::QueryRejection,
        ws::{Message, WebSocket, rejection::WebSocketUpgradeRejection},
    },
    response::{IntoResponse, Response},
};
use futures_util::{
    sink::{Sink, SinkExt},
    stream::{Stream, StreamExt},
};
use std::fmt::Display;
use std::time::Duration;
use tokio::{task::JoinError, time::timeout};
use tracing::{debug, info, warn};

/// `GET /join-room?room_id=...`: resolves the room, then upgrades.
///
/// The room is looked up before the upgrade so that a bad or unknown id is
/// answered with a plain HTTP error instead of an open socket.
pub async fn join_room_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(state): State<AppState>,
    query: Result<Query<JoinRoomQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(query) = query.map_err(|e| AppError::Invalid(e.body_text()))?;
    let room_id = RoomId::parse(&query.room_id)?;
    let room = state.registry.get_room(room_id).await.inspect_err(|_| {
        warn!(%room_id, "attempt to join non-existent room");
    })?;

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    let settings = state.connections.clone();
    let participant = query.participant;
    Ok(ws
        .on_upgrade(move |socket| handle_socket(socket, room, participant, settings))
        .into_response())
}

async fn handle_socket(
    socket: WebSocket,
    room: Room,
    participant: Option<String>,
    settings: ConnectionSettings,
) {
    let (sink, stream) = socket.split();
    serve_connection(sink, stream, room, participant, settings).await;
}

/// Registers the connection with its room and runs both pumps until they
/// finish. If the writer stops first, for instance after an eviction, the
/// reader is aborted so a detached connection cannot keep posting frames.
/// The socket halves are dropped once both pumps are done.
pub async fn serve_connection<Si, St, E>(
    sink: Si,
    stream: St,
    room: Room,
    participant: Option<String>,
    settings: ConnectionSettings,
) where
    Si: Sink<Message> + Unpin + Send + 'static,
    Si::Error: Display + Send,
    St: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
    E: Display + Send + 'static,
{
    let room_id = room.id();
    let (member, mailbox) = room.new_member(participant);
    let connection_id = member.connection_id;

    if let Err(e) = room.join(member).await {
        warn!(%room_id, %connection_id, error = %e, "join failed");
        return;
    }
    info!(%room_id, %connection_id, "client connected");

    let mut writer = tokio::spawn(write_pump(
        sink,
        mailbox,
        connection_id,
        settings.write_timeout,
    ));
    let mut reader = tokio::spawn(read_pump(
        stream,
        room.clone(),
        connection_id,
        settings.read_timeout,
    ));

    let (read_result, write_result) = tokio::select! {
        result = &mut reader => (result, writer.await),
        result = &mut writer => {
            reader.abort();
            let read_result = reader.await;
            // The aborted reader never got to leave.
            let _ = room.leave(connection_id).await;
            (read_result, result)
        }
    };

    log_pump_exit("read", read_result, connection_id);
    log_pump_exit("write", write_result, connection_id);
    info!(%room_id, %connection_id, "client disconnected");
}

fn log_pump_exit(pump: &str, result: Result<(), JoinError>, connection_id: ConnectionId) {
    match result {
        Ok(()) => {}
        Err(e) if e.is_cancelled() => {
            debug!(%connection_id, pump, "pump aborted");
        }
        Err(e) => {
            let err = AppError::Internal(format!("{pump} pump failed: {e}"));
            warn!(%connection_id, error = %err, "pump ended abnormally");
        }
    }
}

/// Inbound pump: posts every text or binary message to the room, in the
/// order read. Ends on close, read error, idle timeout or a closed room, and
/// always leaves the room on the way out.
pub async fn read_pump<S, E>(
    mut stream: S,
    room: Room,
    connection_id: ConnectionId,
    read_timeout: Option<Duration>,
) where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    loop {
        let next = match read_timeout {
            Some(limit) => match timeout(limit, stream.next()).await {
                Ok(next) => next,
                Err(_) => {
                    debug!(%connection_id, "read timed out");
                    break;
                }
            },
            None => stream.next().await,
        };

        let message = match next {
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(message)) => message,
            Some(Err(e)) => {
                debug!(%connection_id, error = %e, "read failed");
                break;
            }
        };

        let Some(frame) = Frame::from_message(message) else {
            continue;
        };
        if room.broadcast(Some(connection_id), frame).await.is_err() {
            break;
        }
    }

    let _ = room.leave(connection_id).await;
}

/// Outbound pump: writes mailbox frames in FIFO order. When the room closes
/// the mailbox it sends a close frame and stops. Write failures just stop the
/// pump; the room notices through its next failed enqueue.
pub async fn write_pump<S>(
    mut sink: S,
    mut mailbox: Mailbox,
    connection_id: ConnectionId,
    write_timeout: Duration,
) where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    while let Some(frame) = mailbox.recv().await {
        match timeout(write_timeout, sink.send(frame.into_message())).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(%connection_id, error = %e, "write failed");
                return;
            }
            Err(_) => {
                debug!(%connection_id, "write timed out");
                return;
            }
        }
    }

    let _ = timeout(write_timeout, sink.send(Message::Close(None))).await;
}
