//! WebSocket handling for player and spectator connections.
//!
//! Each connection is a [`Participant`] whose frames go through a bounded
//! outbound queue drained by a writer task. The reader decodes envelopes and
//! forwards them to the room; a bad frame is answered, never fatal.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{header::AUTHORIZATION, HeaderMap},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;

use chessroom_domain::{ConnectionId, GameId, UserId};
use chessroom_shared::{decode_client_frame, ErrorCode, ServerMessage};

use super::http::ApiError;
use crate::app::App;
use crate::config::TransportConfig;
use crate::infrastructure::ports::IdentityPort;
use crate::session::{DeliveryError, Frame, Participant, RoomCommand};

#[cfg(test)]
mod test_support;

/// A physical connection as seen by its room.
pub struct WsParticipant {
    id: ConnectionId,
    user_id: Option<UserId>,
    outbound: mpsc::Sender<Arc<Frame>>,
    cancel: CancellationToken,
}

impl Participant for WsParticipant {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    fn is_physical(&self) -> bool {
        true
    }

    fn deliver(&self, frame: Arc<Frame>) -> Result<(), DeliveryError> {
        self.outbound.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    fn close(&self) {
        self.cancel.cancel();
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    pub token: Option<String>,
}

/// Upgrade `GET /api/v1/game/ws/{game_id}`.
///
/// The game is resolved before upgrading so unknown ids get a plain 404.
/// A missing or unknown credential joins as spectator.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app): State<Arc<App>>,
    Path(game_id): Path<String>,
    Query(params): Query<ConnectParams>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let game_id = GameId::parse(game_id).map_err(|_| ApiError::NotFound)?;
    app.hub.resolve(&game_id).await?;

    let token = params.token.or_else(|| bearer_token(&headers));
    let user_id = resolve_user(app.identity.as_ref(), token.as_deref()).await;

    let limit = app.transport.max_frame_bytes;
    Ok(ws
        .max_message_size(limit)
        .max_frame_size(limit)
        .on_upgrade(move |socket| handle_socket(socket, app, game_id, user_id)))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|token| token.trim().to_string())
}

async fn resolve_user(identity: &dyn IdentityPort, token: Option<&str>) -> Option<UserId> {
    let token = token.map(str::trim).filter(|t| !t.is_empty())?;
    match identity.resolve_bearer(token).await {
        Ok(Some(user_id)) => Some(user_id),
        Ok(None) => {
            tracing::debug!("Unknown credential, joining as spectator");
            None
        }
        Err(e) => {
            tracing::warn!(error = %e, "Credential lookup failed, joining as spectator");
            None
        }
    }
}

/// Handle an individual WebSocket connection.
async fn handle_socket(socket: WebSocket, app: Arc<App>, game_id: GameId, user_id: Option<UserId>) {
    let transport = app.transport;
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let connection_id = ConnectionId::new();
    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel::<Arc<Frame>>(transport.outbound_capacity);
    let participant = Arc::new(WsParticipant {
        id: connection_id,
        user_id,
        outbound: tx,
        cancel: cancel.clone(),
    });

    let (room, role) = match app.hub.join(&game_id, participant.clone()).await {
        Ok(joined) => joined,
        Err(e) => {
            tracing::warn!(game_id = %game_id, error = %e, "Failed to join room");
            let _ = ws_sender.send(Message::Close(None)).await;
            return;
        }
    };

    tracing::info!(
        game_id = %game_id,
        connection_id = %connection_id,
        role = %role,
        "WebSocket connection established"
    );

    let send_task = tokio::spawn(write_loop(ws_sender, rx, transport, cancel.clone()));

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = timeout(transport.pong_wait, ws_receiver.next()) => next,
        };
        let message = match next {
            Err(_) => {
                tracing::info!(connection_id = %connection_id, "Read deadline passed, closing connection");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                tracing::debug!(connection_id = %connection_id, error = %e, "WebSocket read failed");
                break;
            }
            Ok(Some(Ok(message))) => message,
        };

        match message {
            Message::Text(text) => match decode_client_frame(text.as_str()) {
                Ok(inbound) => {
                    let command = RoomCommand::Inbound {
                        connection_id,
                        message: inbound,
                    };
                    if room.submit(command).await.is_err() {
                        break;
                    }
                }
                Err(e) if e.is_ignorable() => {
                    tracing::debug!(connection_id = %connection_id, error = %e, "Ignoring frame");
                }
                Err(e) => {
                    tracing::warn!(connection_id = %connection_id, error = %e, "Failed to parse message");
                    let reply = ServerMessage::error(
                        ErrorCode::ParseError,
                        format!("Invalid message format: {}", e),
                    );
                    match Frame::encode(reply) {
                        Ok(frame) => {
                            if participant.deliver(Arc::new(frame)).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to encode error frame");
                        }
                    }
                }
            },
            Message::Close(_) => {
                tracing::info!(connection_id = %connection_id, "WebSocket closed by client");
                break;
            }
            Message::Binary(_) => {
                tracing::debug!(connection_id = %connection_id, "Ignoring binary frame");
            }
            // Pings are answered by the transport; both only refresh the deadline.
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    cancel.cancel();
    let _ = room.submit(RoomCommand::Unregister { connection_id }).await;
    let _ = send_task.await;

    tracing::info!(game_id = %game_id, connection_id = %connection_id, "WebSocket connection terminated");
}

/// Drain the outbound queue to the socket and probe liveness.
async fn write_loop<S>(
    mut ws_sender: S,
    mut rx: mpsc::Receiver<Arc<Frame>>,
    transport: TransportConfig,
    cancel: CancellationToken,
) where
    S: futures_util::Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let mut ping = tokio::time::interval_at(
        Instant::now() + transport.ping_period,
        transport.ping_period,
    );

    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = rx.recv() => match frame {
                Some(frame) => Message::Text(frame.text().to_owned().into()),
                None => break,
            },
            _ = ping.tick() => Message::Ping(Bytes::new()),
        };

        match timeout(transport.write_wait, ws_sender.send(message)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "WebSocket write failed");
                break;
            }
            Err(_) => {
                tracing::debug!("WebSocket write timed out");
                break;
            }
        }
    }

    // Stops the reader too when the writer is the side that failed.
    cancel.cancel();
    let _ = timeout(transport.write_wait, ws_sender.send(Message::Close(None))).await;
}
