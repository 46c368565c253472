//! Chessroom Protocol - wire types shared by the session core and its clients
//!
//! This crate contains:
//! - The `{type, payload}` envelope
//! - Client messages (move, chat, game_over) and their decoding
//! - Server messages (init, move, chat, game_over, error) and their encoding
//!
//! # Design Principles
//!
//! 1. **Minimal dependencies** - Only serde, serde_json and thiserror
//! 2. **No business logic** - Pure data types and serialization

pub mod error;
pub mod messages;

pub use error::ProtocolError;
pub use messages::{
    decode_client_frame, ChatPayload, ChatSubmission, ClientMessage, Envelope, ErrorCode,
    ErrorPayload, GameOverPayload, InitPayload, MovePayload, MoveSubmission, ServerMessage,
};
