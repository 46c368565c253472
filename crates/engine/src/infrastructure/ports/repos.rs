//! Collaborator ports: game persistence and bearer identity.
//!
//! Both are owned by the CRUD side of the backend (matchmaking, accounts).
//! The session core only reads seeds, appends accepted moves and records
//! terminal results.

use async_trait::async_trait;
use chessroom_domain::{GameId, GameOutcome, MoveRecord, SessionSeed, UserId};

use super::RepoError;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GameStore: Send + Sync {
    /// Starting position, seats, mode, time control and any persisted
    /// progress. `RepoError::NotFound` for unknown ids.
    async fn resolve_session(&self, game_id: &GameId) -> Result<SessionSeed, RepoError>;

    /// Durably append one accepted move together with the post-move clocks.
    async fn append_move(&self, game_id: &GameId, record: &MoveRecord) -> Result<(), RepoError>;

    /// Mark the game finished with its result and reason.
    async fn finalize(&self, game_id: &GameId, outcome: &GameOutcome) -> Result<(), RepoError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityPort: Send + Sync {
    /// `Ok(None)` for unknown or revoked credentials.
    async fn resolve_bearer(&self, token: &str) -> Result<Option<UserId>, RepoError>;
}
