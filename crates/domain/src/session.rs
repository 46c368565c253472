//! What the persistence collaborator hands to the session core and what the
//! core hands back.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::game::{GameMode, GameStatus, TimeControl};
use crate::ids::{GameId, UserId};
use crate::notation::UciMove;
use crate::side::{Role, Side};

/// FEN of the standard starting position.
pub const STANDARD_START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// One side's seat as recorded by matchmaking.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Seat {
    /// `None` for a seat played by the move engine
    pub user_id: Option<UserId>,
    pub name: String,
}

impl Seat {
    pub fn player(user_id: UserId, name: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id),
            name: name.into(),
        }
    }

    pub fn engine(name: impl Into<String>) -> Self {
        Self {
            user_id: None,
            name: name.into(),
        }
    }
}

/// Initial state of a session as resolved from storage.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSeed {
    pub game_id: GameId,
    /// FEN; empty or `startpos` means the standard position
    pub starting_position: String,
    pub white: Seat,
    pub black: Seat,
    pub status: GameStatus,
    pub mode: GameMode,
    pub time_control: TimeControl,
    /// Moves already played, oldest first
    pub history: Vec<UciMove>,
    pub white_remaining: Option<Duration>,
    pub black_remaining: Option<Duration>,
    pub last_move_at: Option<DateTime<Utc>>,
}

impl SessionSeed {
    /// A fresh game at the standard position with default clocks.
    pub fn new(
        game_id: GameId,
        white: Seat,
        black: Seat,
        status: GameStatus,
        mode: GameMode,
        time_control: TimeControl,
    ) -> Self {
        Self {
            game_id,
            starting_position: STANDARD_START_FEN.to_string(),
            white,
            black,
            status,
            mode,
            time_control,
            history: Vec::new(),
            white_remaining: None,
            black_remaining: None,
            last_move_at: None,
        }
    }

    pub fn seat(&self, side: Side) -> &Seat {
        match side {
            Side::White => &self.white,
            Side::Black => &self.black,
        }
    }

    /// FEN to present to clients, normalising the `startpos` shorthand.
    pub fn starting_fen(&self) -> &str {
        match self.starting_position.trim() {
            "" | "startpos" => STANDARD_START_FEN,
            fen => fen,
        }
    }

    /// Seat a user would take when connecting; anyone else spectates.
    pub fn role_for(&self, user_id: Option<UserId>) -> Role {
        match user_id {
            Some(id) if self.white.user_id == Some(id) => Role::White,
            Some(id) if self.black.user_id == Some(id) => Role::Black,
            _ => Role::Spectator,
        }
    }

    /// Side the engine plays in an `ai` game: the seat without a user,
    /// black when both are empty.
    pub fn engine_side(&self) -> Option<Side> {
        if !self.mode.is_ai() {
            return None;
        }
        match (self.white.user_id, self.black.user_id) {
            (Some(_), None) | (None, None) => Some(Side::Black),
            (None, Some(_)) => Some(Side::White),
            (Some(_), Some(_)) => None,
        }
    }
}

/// One accepted move, as handed to persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveRecord {
    /// 1-based ply number
    pub move_number: u32,
    pub side: Side,
    pub player_id: Option<UserId>,
    pub notation: UciMove,
    pub white_remaining: Duration,
    pub black_remaining: Duration,
    pub played_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(mode: GameMode, white: Seat, black: Seat) -> SessionSeed {
        SessionSeed::new(
            GameId::parse("g1").unwrap(),
            white,
            black,
            GameStatus::Active,
            mode,
            TimeControl::default(),
        )
    }

    #[test]
    fn role_for_matches_seats_and_defaults_to_spectator() {
        let s = seed(
            GameMode::Blitz,
            Seat::player(UserId::new(1), "alice"),
            Seat::player(UserId::new(2), "bob"),
        );
        assert_eq!(s.role_for(Some(UserId::new(1))), Role::White);
        assert_eq!(s.role_for(Some(UserId::new(2))), Role::Black);
        assert_eq!(s.role_for(Some(UserId::new(3))), Role::Spectator);
        assert_eq!(s.role_for(None), Role::Spectator);
    }

    #[test]
    fn engine_side_is_the_empty_seat_in_ai_games() {
        let s = seed(
            GameMode::Ai,
            Seat::engine("stockfish"),
            Seat::player(UserId::new(2), "bob"),
        );
        assert_eq!(s.engine_side(), Some(Side::White));

        let human_vs_human = seed(
            GameMode::Rapid,
            Seat::player(UserId::new(1), "alice"),
            Seat::default(),
        );
        assert_eq!(human_vs_human.engine_side(), None);
    }

    #[test]
    fn startpos_shorthand_is_normalised() {
        let mut s = seed(GameMode::Blitz, Seat::default(), Seat::default());
        s.starting_position = "startpos".into();
        assert_eq!(s.starting_fen(), STANDARD_START_FEN);
    }
}
