//! Live-connection handling: one task per socket, one outbound queue per
//! connection, and the message ingress state machine
//! (Submitted -> Persisted -> Broadcast -> Acknowledged).

use crate::api::AppState;
use crate::auth::Claims;
use crate::error::ChatError;
use crate::registry::ConnectionId;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Extension;
use futures::{SinkExt, StreamExt};
use semchat_protocol::{AckResult, ChatMessage, ClientEvent, SemesterId, ServerEvent, UserRef};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, claims))
}

async fn handle_socket(socket: WebSocket, state: AppState, claims: Claims) {
    let conn = ConnectionId::new();
    let user = claims.user();
    let (mut sink, mut stream) = socket.split();

    // Acks and broadcasts share one queue, so nothing interleaves
    // mid-frame and delivery order is the enqueue order.
    let (tx, rx) = mpsc::unbounded_channel::<String>();
    let mut outbound = UnboundedReceiverStream::new(rx);

    send_event(&tx, &ServerEvent::Hello { user: user.clone() });

    loop {
        tokio::select! {
            Some(payload) = outbound.next() => {
                if sink.send(Message::Text(payload)).await.is_err() {
                    break;
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientEvent>(&text) {
                            Ok(event) => handle_event(&state, conn, &user, &tx, event).await,
                            Err(err) => tracing::debug!(%err, "ignoring malformed client event"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    // Transport is gone; membership must not outlive the disconnect.
    state.registry.remove_connection(conn);
    tracing::debug!(user = %user.id, "connection closed");
}

fn send_event(tx: &mpsc::UnboundedSender<String>, event: &ServerEvent) {
    if let Ok(payload) = serde_json::to_string(event) {
        let _ = tx.send(payload);
    }
}

async fn handle_event(
    state: &AppState,
    conn: ConnectionId,
    user: &UserRef,
    tx: &mpsc::UnboundedSender<String>,
    event: ClientEvent,
) {
    match event {
        ClientEvent::JoinRoom { room } => match SemesterId::parse_room(&room) {
            Ok(semester) => {
                state.registry.join(conn, semester, tx.clone());
                tracing::info!(user = %user.id, room = %room, "joined room");
            }
            Err(err) => tracing::debug!(%err, "join rejected"),
        },
        ClientEvent::MessageCreate {
            room,
            text,
            temp_id,
            user: payload_user,
        } => {
            let result =
                ingest_message(state, conn, user, &room, text, temp_id.clone(), payload_user)
                    .await;
            let result = match result {
                Ok(message) => AckResult::Ok { message },
                Err(err) => {
                    tracing::warn!(user = %user.id, %err, "message rejected");
                    AckResult::Err {
                        error: err.code().to_string(),
                    }
                }
            };
            send_event(tx, &ServerEvent::MessageAck { temp_id, result });
        }
        ClientEvent::Typing { room, .. } => {
            if let Some(semester) = joined_room(state, conn, &room) {
                state.broadcaster.broadcast_except(
                    semester,
                    &ServerEvent::UserTyping {
                        user_id: user.id.clone(),
                        name: user.name.clone(),
                    },
                    conn,
                );
            }
        }
        ClientEvent::StopTyping { room, .. } => {
            if let Some(semester) = joined_room(state, conn, &room) {
                state.broadcaster.broadcast_except(
                    semester,
                    &ServerEvent::UserStopTyping {
                        user_id: user.id.clone(),
                    },
                    conn,
                );
            }
        }
    }
}

/// Typing signals are only relayed within the room the connection has
/// actually joined; anything else is dropped.
fn joined_room(state: &AppState, conn: ConnectionId, room: &str) -> Option<SemesterId> {
    let semester = SemesterId::parse_room(room).ok()?;
    (state.registry.room_of(conn) == Some(semester)).then_some(semester)
}

/// One message's journey from client intent to confirmed fact: validate,
/// persist, broadcast to peers, and hand the persisted message back for
/// the direct acknowledgment. Broadcast strictly follows persistence, so
/// peers never see a message the sender was told failed.
async fn ingest_message(
    state: &AppState,
    conn: ConnectionId,
    sender: &UserRef,
    room: &str,
    text: String,
    temp_id: Option<String>,
    payload_user: Option<UserRef>,
) -> Result<ChatMessage, ChatError> {
    let semester = SemesterId::parse_room(room)?;
    if text.trim().is_empty() {
        return Err(ChatError::Validation("empty_text".into()));
    }
    // The wire contract carries a user payload; identity itself always
    // comes from the verified session claims.
    match payload_user {
        Some(user) if !user.id.is_empty() && !user.name.is_empty() => {}
        _ => return Err(ChatError::Validation("missing_user".into())),
    }
    let message = state
        .store
        .append(semester, sender.clone(), text, temp_id)
        .await?;
    // The sender's own copy travels on the direct ack, not the broadcast.
    state.broadcaster.broadcast_except(
        semester,
        &ServerEvent::MessageNew {
            message: message.clone(),
        },
        conn,
    );
    Ok(message)
}
