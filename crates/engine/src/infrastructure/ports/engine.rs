//! Move engine port.

use std::sync::Arc;

use async_trait::async_trait;
use chessroom_domain::UciMove;

use super::EngineError;

/// Position to search: a starting FEN (`None` for the standard start) plus
/// the moves played since.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnginePosition {
    pub fen: Option<String>,
    pub moves: Vec<UciMove>,
}

impl EnginePosition {
    pub fn new(fen: Option<String>, moves: Vec<UciMove>) -> Self {
        Self { fen, moves }
    }

    /// The UCI `position` command for this position.
    pub fn to_command(&self) -> String {
        let mut command = match &self.fen {
            Some(fen) => format!("position fen {fen}"),
            None => "position startpos".to_string(),
        };
        if !self.moves.is_empty() {
            command.push_str(" moves");
            for mv in &self.moves {
                command.push(' ');
                command.push_str(mv.as_str());
            }
        }
        command
    }
}

/// One engine process. Queries against the same instance are serialized.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MoveEngine: Send + Sync {
    async fn best_move(&self, position: &EnginePosition) -> Result<UciMove, EngineError>;

    /// Stop the process. Later queries fail.
    async fn shutdown(&self);
}

/// Starts a fresh engine process per engine-backed participant.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EngineLauncher: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn MoveEngine>, EngineError>;
}
