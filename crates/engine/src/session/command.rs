//! Commands consumed by a room loop, and the read-only view it can reply with.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::oneshot;

use chessroom_domain::{ConnectionId, GameId, GameStatus, Role, Side, UciMove};
use chessroom_shared::ClientMessage;

use super::participant::Participant;

/// Everything that can happen to a room, processed strictly in arrival order.
pub enum RoomCommand {
    /// Join with a seat (or as spectator). A seated role already held by
    /// another connection is taken over.
    Register {
        participant: Arc<dyn Participant>,
        role: Role,
    },
    Unregister {
        connection_id: ConnectionId,
    },
    /// A decoded frame from a registered participant
    Inbound {
        connection_id: ConnectionId,
        message: ClientMessage,
    },
    /// Periodic flag check and idle eviction check
    ClockTick,
    Snapshot {
        reply: oneshot::Sender<RoomSnapshot>,
    },
}

impl RoomCommand {
    pub fn kind(&self) -> &'static str {
        match self {
            RoomCommand::Register { .. } => "register",
            RoomCommand::Unregister { .. } => "unregister",
            RoomCommand::Inbound { .. } => "inbound",
            RoomCommand::ClockTick => "clock_tick",
            RoomCommand::Snapshot { .. } => "snapshot",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParticipantSummary {
    pub connection_id: ConnectionId,
    pub role: Role,
    pub physical: bool,
}

/// Point-in-time copy of a room's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomSnapshot {
    pub game_id: GameId,
    pub status: GameStatus,
    pub current_turn: Side,
    pub history: Vec<UciMove>,
    pub white_remaining_ms: u64,
    pub black_remaining_ms: u64,
    pub last_move_at: DateTime<Utc>,
    pub participants: Vec<ParticipantSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RoomSnapshot {
    #[cfg(test)]
    pub fn holders(&self, role: Role) -> usize {
        self.participants.iter().filter(|p| p.role == role).count()
    }

    #[cfg(test)]
    pub fn history_str(&self) -> Vec<&str> {
        self.history.iter().map(UciMove::as_str).collect()
    }
}
