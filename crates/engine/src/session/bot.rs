//! Engine-backed participant (computer opponent).
//!
//! Registers with the room like any connection, but its inbox feeds a driver
//! task instead of a socket. The driver mirrors the move history from `init`
//! and `move` broadcasts and, whenever the mirror says it is its side's turn,
//! asks the engine for a move and submits it as an ordinary inbound `move`.
//! Its own move is only added to the mirror when the room echoes it back.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use chessroom_domain::{ConnectionId, GameStatus, Side, UciMove, UserId, STANDARD_START_FEN};
use chessroom_shared::{ClientMessage, MoveSubmission, ServerMessage};

use super::command::RoomCommand;
use super::handle::{RoomClosed, RoomHandle};
use super::participant::{DeliveryError, Frame, Participant};
use crate::infrastructure::ports::{EngineError, EngineLauncher, EnginePosition, MoveEngine};

#[derive(Debug, thiserror::Error)]
pub enum AttachError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Room(#[from] RoomClosed),
}

pub struct EngineParticipant {
    id: ConnectionId,
    inbox: mpsc::Sender<Arc<Frame>>,
    cancel: CancellationToken,
}

impl Participant for EngineParticipant {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn user_id(&self) -> Option<UserId> {
        None
    }

    fn is_physical(&self) -> bool {
        false
    }

    fn deliver(&self, frame: Arc<Frame>) -> Result<(), DeliveryError> {
        self.inbox.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    fn close(&self) {
        self.cancel.cancel();
    }
}

/// Launch an engine and seat it on `side`.
pub async fn attach(
    room: RoomHandle,
    side: Side,
    launcher: Arc<dyn EngineLauncher>,
    inbox_capacity: usize,
) -> Result<ConnectionId, AttachError> {
    let engine = launcher.launch().await?;

    let id = ConnectionId::new();
    let cancel = CancellationToken::new();
    let (inbox, frames) = mpsc::channel(inbox_capacity);
    let participant = Arc::new(EngineParticipant {
        id,
        inbox,
        cancel: cancel.clone(),
    });

    let driver = EngineDriver {
        room: room.clone(),
        id,
        side,
        engine,
        fen: None,
        history: Vec::new(),
        cancel: cancel.clone(),
    };
    tokio::spawn(driver.run(frames));

    if let Err(e) = room
        .submit(RoomCommand::Register {
            participant,
            role: side.into(),
        })
        .await
    {
        cancel.cancel();
        return Err(e.into());
    }

    tracing::info!(game_id = %room.game_id(), connection_id = %id, side = %side, "Engine opponent seated");
    Ok(id)
}

enum Flow {
    Continue,
    Stop,
}

struct EngineDriver {
    room: RoomHandle,
    id: ConnectionId,
    side: Side,
    engine: Arc<dyn MoveEngine>,
    /// `None` when the game starts from the standard position
    fen: Option<String>,
    history: Vec<UciMove>,
    cancel: CancellationToken,
}

impl EngineDriver {
    async fn run(mut self, mut frames: mpsc::Receiver<Arc<Frame>>) {
        loop {
            let frame = tokio::select! {
                _ = self.cancel.cancelled() => break,
                frame = frames.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
            };

            let flow = match self.observe(frame.message()) {
                Ok(true) => self.play().await,
                Ok(false) => Flow::Continue,
                Err(flow) => flow,
            };
            if let Flow::Stop = flow {
                break;
            }
        }

        self.engine.shutdown().await;
        // No-op if the room already dropped us; fails harmlessly if it is gone.
        let _ = self
            .room
            .submit(RoomCommand::Unregister {
                connection_id: self.id,
            })
            .await;
        tracing::info!(game_id = %self.room.game_id(), connection_id = %self.id, "Engine opponent stopped");
    }

    fn my_turn(&self) -> bool {
        Side::to_move_after(self.history.len()) == self.side
    }

    /// Update the mirror. `Ok(true)` when a search is due.
    fn observe(&mut self, message: &ServerMessage) -> Result<bool, Flow> {
        match message {
            ServerMessage::Init(init) => {
                self.fen = (init.fen != STANDARD_START_FEN).then(|| init.fen.clone());
                self.history = init
                    .history
                    .iter()
                    .map(|raw| UciMove::parse(raw))
                    .collect::<Result<_, _>>()
                    .map_err(|e| {
                        tracing::warn!(game_id = %self.room.game_id(), error = %e, "Unreadable history, disabling engine opponent");
                        Flow::Stop
                    })?;
                tracing::debug!(
                    game_id = %self.room.game_id(),
                    plies = self.history.len(),
                    "Engine opponent initialised"
                );
                match init.status {
                    GameStatus::Finished => Err(Flow::Stop),
                    GameStatus::Active => Ok(self.my_turn()),
                    GameStatus::Waiting => Ok(false),
                }
            }
            ServerMessage::Move(mv) => {
                let notation = UciMove::parse(&mv.notation).map_err(|e| {
                    tracing::warn!(game_id = %self.room.game_id(), error = %e, "Unreadable move, disabling engine opponent");
                    Flow::Stop
                })?;
                self.history.push(notation);
                Ok(self.my_turn())
            }
            ServerMessage::GameOver(_) => Err(Flow::Stop),
            ServerMessage::Error(error) => {
                tracing::debug!(game_id = %self.room.game_id(), code = ?error.code, message = %error.message, "Engine move refused");
                Ok(false)
            }
            ServerMessage::Chat(_) => Ok(false),
        }
    }

    async fn play(&self) -> Flow {
        let position = EnginePosition::new(self.fen.clone(), self.history.clone());

        let result = tokio::select! {
            _ = self.cancel.cancelled() => return Flow::Stop,
            result = self.engine.best_move(&position) => result,
        };

        let best = match result {
            Ok(best) => best,
            Err(e) => {
                tracing::warn!(
                    game_id = %self.room.game_id(),
                    connection_id = %self.id,
                    error = %e,
                    "Engine failed, disabling engine opponent"
                );
                return Flow::Stop;
            }
        };

        tracing::debug!(game_id = %self.room.game_id(), notation = %best, "Engine move");
        let submitted = self
            .room
            .submit(RoomCommand::Inbound {
                connection_id: self.id,
                message: ClientMessage::Move(MoveSubmission::new(best.as_str())),
            })
            .await;
        match submitted {
            Ok(()) => Flow::Continue,
            Err(RoomClosed) => Flow::Stop,
        }
    }
}
