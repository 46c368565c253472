//! Sides of the board and seat roles.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// One side of the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    White,
    Black,
}

impl Side {
    pub fn opponent(self) -> Side {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::White => "white",
            Side::Black => "black",
        }
    }

    /// The side to move after `plies` half-moves from a white-to-move start.
    pub fn to_move_after(plies: usize) -> Side {
        if plies % 2 == 0 {
            Side::White
        } else {
            Side::Black
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "white" => Ok(Side::White),
            "black" => Ok(Side::Black),
            _ => Err(DomainError::parse(format!("Unknown side: {}", s))),
        }
    }
}

/// Seat assignment of a participant in a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    White,
    Black,
    /// Can watch and chat but never move or end the game
    #[default]
    Spectator,
}

impl Role {
    /// The board side this role plays, if any.
    pub fn side(self) -> Option<Side> {
        match self {
            Role::White => Some(Side::White),
            Role::Black => Some(Side::Black),
            Role::Spectator => None,
        }
    }

    pub fn is_spectator(self) -> bool {
        matches!(self, Role::Spectator)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::White => "white",
            Role::Black => "black",
            Role::Spectator => "spectator",
        }
    }
}

impl From<Side> for Role {
    fn from(side: Side) -> Self {
        match side {
            Side::White => Role::White,
            Side::Black => Role::Black,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_to_move_alternates_from_white() {
        assert_eq!(Side::to_move_after(0), Side::White);
        assert_eq!(Side::to_move_after(1), Side::Black);
        assert_eq!(Side::to_move_after(2), Side::White);
    }

    #[test]
    fn spectator_has_no_side() {
        assert_eq!(Role::Spectator.side(), None);
        assert_eq!(Role::from(Side::Black).side(), Some(Side::Black));
    }

    #[test]
    fn roles_serialize_lowercase() {
        assert_eq!(
            serde_json::to_string(&Role::Spectator).unwrap(),
            "\"spectator\""
        );
        assert_eq!("black".parse::<Side>().unwrap(), Side::Black);
    }
}
