//! Cloneable handle used to submit commands to a running room.

use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use chessroom_domain::{GameId, Role, SessionSeed, UserId};

use super::command::{RoomCommand, RoomSnapshot};

/// The room loop has exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Room is closed")]
pub struct RoomClosed;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("Room command queue is full")]
    Full,
    #[error("Room is closed")]
    Closed,
}

#[derive(Clone)]
pub struct RoomHandle {
    game_id: GameId,
    /// Distinguishes successive rooms for the same game id
    instance: Uuid,
    sender: mpsc::Sender<RoomCommand>,
    white: Option<UserId>,
    black: Option<UserId>,
}

impl RoomHandle {
    pub(crate) fn new(seed: &SessionSeed, sender: mpsc::Sender<RoomCommand>) -> Self {
        Self {
            game_id: seed.game_id.clone(),
            instance: Uuid::new_v4(),
            sender,
            white: seed.white.user_id,
            black: seed.black.user_id,
        }
    }

    pub fn game_id(&self) -> &GameId {
        &self.game_id
    }

    pub fn instance(&self) -> Uuid {
        self.instance
    }

    /// Seat a user takes when connecting; everyone else spectates.
    pub fn role_for(&self, user_id: Option<UserId>) -> Role {
        match user_id {
            Some(id) if self.white == Some(id) => Role::White,
            Some(id) if self.black == Some(id) => Role::Black,
            _ => Role::Spectator,
        }
    }

    /// Queue a command, waiting while the queue is full.
    pub async fn submit(&self, command: RoomCommand) -> Result<(), RoomClosed> {
        self.sender.send(command).await.map_err(|_| RoomClosed)
    }

    pub fn try_submit(&self, command: RoomCommand) -> Result<(), SubmitError> {
        self.sender.try_send(command).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SubmitError::Full,
            mpsc::error::TrySendError::Closed(_) => SubmitError::Closed,
        })
    }

    pub async fn snapshot(&self) -> Result<RoomSnapshot, RoomClosed> {
        let (reply, response) = oneshot::channel();
        self.submit(RoomCommand::Snapshot { reply }).await?;
        response.await.map_err(|_| RoomClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Resolves once the room loop has exited.
    pub async fn closed(&self) {
        self.sender.closed().await
    }
}

impl std::fmt::Debug for RoomHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomHandle")
            .field("game_id", &self.game_id)
            .field("instance", &self.instance)
            .field("closed", &self.is_closed())
            .finish()
    }
}
