//! Per-side game clock.
//!
//! Remaining time is frozen between moves; only the side to move is charged,
//! and only when it moves or when its flag is checked.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::side::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameClock {
    white: Duration,
    black: Duration,
    last_move_at: DateTime<Utc>,
}

impl GameClock {
    pub fn new(white: Duration, black: Duration, last_move_at: DateTime<Utc>) -> Self {
        Self {
            white,
            black,
            last_move_at,
        }
    }

    pub fn remaining(&self, side: Side) -> Duration {
        match side {
            Side::White => self.white,
            Side::Black => self.black,
        }
    }

    pub fn last_move_at(&self) -> DateTime<Utc> {
        self.last_move_at
    }

    /// Wall-clock time since the reference point; never negative.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        (now - self.last_move_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Time `side` would have left if it moved at `now`.
    pub fn projected(&self, side: Side, now: DateTime<Utc>) -> Duration {
        self.remaining(side).saturating_sub(self.elapsed(now))
    }

    /// Whether `side` has used up its time as of `now`.
    pub fn is_flagged(&self, side: Side, now: DateTime<Utc>) -> bool {
        self.projected(side, now).is_zero()
    }

    /// Charge `side` for the time since the last move, floored at zero, and
    /// restart the reference point at `now`. Returns the new remaining time.
    pub fn charge(&mut self, side: Side, now: DateTime<Utc>) -> Duration {
        let left = self.projected(side, now);
        match side {
            Side::White => self.white = left,
            Side::Black => self.black = left,
        }
        self.last_move_at = now;
        left
    }

    /// Zero out a flagged side without moving the reference point.
    pub fn flag(&mut self, side: Side) {
        match side {
            Side::White => self.white = Duration::ZERO,
            Side::Black => self.black = Duration::ZERO,
        }
    }

    /// Restart the reference point without charging anyone (game start).
    pub fn restart(&mut self, now: DateTime<Utc>) {
        self.last_move_at = now;
    }
}
