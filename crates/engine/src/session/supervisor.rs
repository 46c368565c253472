//! Clock supervisor: feeds `ClockTick` into a room at a fixed period.
//!
//! Ticks are submitted with `try_submit`; a full command queue just skips a
//! tick. The task ends when the room loop exits.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::command::RoomCommand;
use super::handle::{RoomHandle, SubmitError};

pub fn spawn_clock_ticker(room: RoomHandle, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = room.closed() => break,
                _ = interval.tick() => {
                    match room.try_submit(RoomCommand::ClockTick) {
                        Ok(()) => {}
                        Err(SubmitError::Full) => {
                            tracing::debug!(game_id = %room.game_id(), "Room busy, clock tick skipped");
                        }
                        Err(SubmitError::Closed) => break,
                    }
                }
            }
        }
        tracing::debug!(game_id = %room.game_id(), "clock ticker stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chessroom_domain::{GameId, GameMode, GameStatus, Seat, SessionSeed, TimeControl};
    use tokio::sync::mpsc;

    fn handle(capacity: usize) -> (RoomHandle, mpsc::Receiver<RoomCommand>) {
        let seed = SessionSeed::new(
            GameId::parse("g1").unwrap(),
            Seat::default(),
            Seat::default(),
            GameStatus::Active,
            GameMode::Blitz,
            TimeControl::default(),
        );
        let (sender, receiver) = mpsc::channel(capacity);
        (RoomHandle::new(&seed, sender), receiver)
    }

    #[tokio::test(start_paused = true)]
    async fn when_period_elapses_then_ticks_are_submitted() {
        let (room, mut commands) = handle(8);
        let _ticker = spawn_clock_ticker(room, Duration::from_millis(100));

        for _ in 0..3 {
            let command = commands.recv().await.unwrap();
            assert!(matches!(command, RoomCommand::ClockTick));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn when_room_closes_then_ticker_stops() {
        let (room, commands) = handle(8);
        let ticker = spawn_clock_ticker(room, Duration::from_millis(100));
        drop(commands);

        tokio::time::timeout(Duration::from_secs(5), ticker)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn when_queue_is_full_then_ticks_are_skipped_not_queued() {
        let (room, mut commands) = handle(1);
        let _ticker = spawn_clock_ticker(room, Duration::from_millis(100));

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert!(matches!(commands.recv().await, Some(RoomCommand::ClockTick)));
        assert!(commands.try_recv().is_err());
    }
}
