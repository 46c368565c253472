//! WebSocket message types exchanged between participants and a game session
//!
//! Every frame is a self-contained envelope `{"type": ..., "payload": ...}`.
//! Participants send [`ClientMessage`]s; the session sends [`ServerMessage`]s.
//!
//! ## Trust boundary
//!
//! - Client chat frames contribute only `text`; sender and timestamp are
//!   stamped by the session.
//! - `game_over` payloads keep the sender's exact text so the session can
//!   redistribute it byte for byte.
//! - Unknown `type` values are reported as [`ProtocolError::UnknownType`] so the
//!   transport can drop them without closing the connection.

use serde::ser::{Error as _, SerializeMap};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::value::RawValue;
use serde_json::{Map, Value};

use chessroom_domain::{GameStatus, Role, Side, UserId};

use crate::error::ProtocolError;

/// Raw envelope, used to route a frame before its payload is interpreted.
/// The payload borrows the untouched text of the frame.
#[derive(Debug, Deserialize)]
pub struct Envelope<'a> {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(borrow, default)]
    pub payload: Option<&'a RawValue>,
}

impl<'a> Envelope<'a> {
    /// Payload text, `null` when the frame carried none.
    pub fn payload_text(&self) -> &'a str {
        self.payload.map_or("null", RawValue::get)
    }
}

// =============================================================================
// Client Messages (participant → session)
// =============================================================================

/// Messages a participant may submit to its session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Play a move for the sender's side
    Move(MoveSubmission),
    /// Free text for everyone in the room
    Chat(ChatSubmission),
    /// Report the end of the game (checkmate, resignation, agreed draw...)
    GameOver(GameOverPayload),
}

impl ClientMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Move(_) => "move",
            ClientMessage::Chat(_) => "chat",
            ClientMessage::GameOver(_) => "game_over",
        }
    }
}

/// A submitted move: either a bare string (`"e2e4"`) or `{"move": "e2e4"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MoveSubmission {
    Bare(String),
    Object {
        #[serde(rename = "move")]
        notation: String,
    },
}

impl MoveSubmission {
    pub fn new(notation: impl Into<String>) -> Self {
        Self::Bare(notation.into())
    }

    pub fn notation(&self) -> &str {
        match self {
            MoveSubmission::Bare(notation) => notation,
            MoveSubmission::Object { notation } => notation,
        }
    }
}

/// Client chat; anything besides `text` is discarded on decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSubmission {
    pub text: String,
}

/// `game_over` payload, shared by both directions.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GameOverPayload {
    /// "1-0", "0-1", "1/2-1/2"
    pub result: String,
    /// "checkmate", "stalemate", "draw", "timeout", "resign"
    pub reason: String,
    /// "white", "black", or absent/empty for a draw
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<String>,
    /// Fields this server does not interpret, kept for redistribution
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    /// Payload text as received. When set, it is encoded instead of the fields.
    #[serde(skip)]
    pub raw: Option<String>,
}

impl Serialize for GameOverPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if let Some(raw) = &self.raw {
            let raw = RawValue::from_string(raw.clone()).map_err(S::Error::custom)?;
            return raw.serialize(serializer);
        }

        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("result", &self.result)?;
        map.serialize_entry("reason", &self.reason)?;
        if let Some(winner) = &self.winner {
            map.serialize_entry("winner", winner)?;
        }
        for (key, value) in &self.extra {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl GameOverPayload {
    pub fn new(result: impl Into<String>, reason: impl Into<String>, winner: Option<Side>) -> Self {
        Self {
            result: result.into(),
            reason: reason.into(),
            winner: winner.map(|side| side.as_str().to_string()),
            extra: Map::new(),
            raw: None,
        }
    }
}

// =============================================================================
// Server Messages (session → participant)
// =============================================================================

/// Messages a session delivers to its participants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full state, sent once to each participant right after it registers
    Init(InitPayload),
    /// An accepted move with the post-move clocks
    Move(MovePayload),
    Chat(ChatPayload),
    GameOver(GameOverPayload),
    /// Sent only to the participant whose frame was refused
    Error(ErrorPayload),
}

impl ServerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Init(_) => "init",
            ServerMessage::Move(_) => "move",
            ServerMessage::Chat(_) => "chat",
            ServerMessage::GameOver(_) => "game_over",
            ServerMessage::Error(_) => "error",
        }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error(ErrorPayload {
            code,
            message: message.into(),
        })
    }

    /// Encode as one text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitPayload {
    pub fen: String,
    pub history: Vec<String>,
    pub white_id: Option<UserId>,
    pub black_id: Option<UserId>,
    pub white_name: String,
    pub black_name: String,
    pub status: GameStatus,
    /// Role of the receiving participant
    pub color: Role,
    /// Remaining seconds, frozen at the last move
    pub white_time: u64,
    pub black_time: u64,
    /// Unix milliseconds of the last move (or game start)
    pub last_move_at: i64,
    pub current_turn: Side,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovePayload {
    #[serde(rename = "move")]
    pub notation: String,
    pub white_time: u64,
    pub black_time: u64,
    pub last_move_at: i64,
    /// Side to move after this move
    pub current_turn: Side,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatPayload {
    pub sender: Role,
    pub text: String,
    /// RFC 3339, stamped by the session
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ParseError,
    Spectator,
    NotYourTurn,
    NotActive,
    InvalidMove,
    InvalidResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: ErrorCode,
    pub message: String,
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode one inbound text frame.
///
/// # Errors
///
/// - [`ProtocolError::Malformed`] if the text is not an envelope
/// - [`ProtocolError::ServerOnly`] for `init`/`error` frames sent by a client
/// - [`ProtocolError::UnknownType`] for any other unrecognised `type`
/// - [`ProtocolError::InvalidPayload`] if the payload does not fit its type
pub fn decode_client_frame(text: &str) -> Result<ClientMessage, ProtocolError> {
    let envelope: Envelope =
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    let payload = envelope.payload_text();

    let invalid = |e: serde_json::Error| ProtocolError::InvalidPayload {
        kind: envelope.kind.clone(),
        reason: e.to_string(),
    };

    match envelope.kind.as_str() {
        "move" => serde_json::from_str(payload)
            .map(ClientMessage::Move)
            .map_err(invalid),
        "chat" => serde_json::from_str(payload)
            .map(ClientMessage::Chat)
            .map_err(invalid),
        "game_over" => serde_json::from_str::<GameOverPayload>(payload)
            .map(|mut over| {
                over.raw = Some(payload.to_string());
                ClientMessage::GameOver(over)
            })
            .map_err(invalid),
        "init" | "error" => Err(ProtocolError::ServerOnly(envelope.kind)),
        _ => Err(ProtocolError::UnknownType(envelope.kind)),
    }
}
