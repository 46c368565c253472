//! Protocol errors.

/// Why an inbound frame could not be turned into a [`crate::ClientMessage`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Malformed frame: {0}")]
    Malformed(String),

    #[error("Unknown message type: {0}")]
    UnknownType(String),

    #[error("Invalid {kind} payload: {reason}")]
    InvalidPayload { kind: String, reason: String },

    /// A type only the server may send
    #[error("Message type {0} cannot be sent by a participant")]
    ServerOnly(String),

    #[error("Failed to encode frame: {0}")]
    Encode(String),
}

impl ProtocolError {
    /// Frames that should be dropped quietly rather than answered with an error.
    pub fn is_ignorable(&self) -> bool {
        matches!(self, Self::UnknownType(_) | Self::ServerOnly(_))
    }
}
