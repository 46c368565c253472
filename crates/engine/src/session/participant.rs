//! Room participants.
//!
//! Anything that can receive room broadcasts and submit commands is a
//! participant: a websocket connection or an engine-backed opponent.

use std::sync::Arc;

use chessroom_domain::{ConnectionId, UserId};
use chessroom_shared::{ProtocolError, ServerMessage};

/// One encoded server message. Broadcasts share a single `Arc<Frame>`, so
/// every participant receives the same bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    message: ServerMessage,
    text: String,
}

impl Frame {
    pub fn encode(message: ServerMessage) -> Result<Self, ProtocolError> {
        let text = message.encode()?;
        Ok(Self { message, text })
    }

    pub fn message(&self) -> &ServerMessage {
        &self.message
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("Outbound queue is full")]
    Full,
    #[error("Participant is gone")]
    Closed,
}

/// A registered member of a room.
///
/// `deliver` must never block: the room loop calls it for every participant
/// in turn.
pub trait Participant: Send + Sync {
    fn id(&self) -> ConnectionId;

    /// Authenticated account, if any
    fn user_id(&self) -> Option<UserId>;

    /// `false` for engine-backed participants; only physical participants
    /// keep an idle room alive.
    fn is_physical(&self) -> bool;

    fn deliver(&self, frame: Arc<Frame>) -> Result<(), DeliveryError>;

    /// Tear down the transport (or stop the engine driver).
    fn close(&self);
}
