//! Ordered, best-effort persistence writer.
//!
//! The room hands jobs to an unbounded queue and never awaits the store. One
//! writer task per room applies them in acceptance order. Failures are logged
//! only: in-memory state stays authoritative for live play.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use chessroom_domain::{GameId, GameOutcome, MoveRecord};

use crate::infrastructure::ports::GameStore;

#[derive(Debug, Clone, PartialEq)]
pub enum PersistJob {
    AppendMove(MoveRecord),
    Finalize(GameOutcome),
}

pub type PersistQueue = mpsc::UnboundedSender<PersistJob>;

/// Start the writer for `game_id`. It stops once every sender is dropped and
/// the queue is drained.
pub fn spawn_writer(game_id: GameId, store: Arc<dyn GameStore>) -> (PersistQueue, JoinHandle<()>) {
    let (sender, mut jobs) = mpsc::unbounded_channel::<PersistJob>();

    let task = tokio::spawn(async move {
        while let Some(job) = jobs.recv().await {
            match job {
                PersistJob::AppendMove(record) => {
                    if let Err(e) = store.append_move(&game_id, &record).await {
                        tracing::warn!(
                            error = %e,
                            game_id = %game_id,
                            move_number = record.move_number,
                            "Failed to persist move"
                        );
                    }
                }
                PersistJob::Finalize(outcome) => {
                    if let Err(e) = store.finalize(&game_id, &outcome).await {
                        tracing::warn!(
                            error = %e,
                            game_id = %game_id,
                            result = %outcome.result,
                            "Failed to persist game result"
                        );
                    }
                }
            }
        }
        tracing::debug!(game_id = %game_id, "persistence writer stopped");
    });

    (sender, task)
}
