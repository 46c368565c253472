//! Square-pair move notation (`<from><to>[promotion]`).
//!
//! Only the shape is checked. Whether a move is legal on the board is never
//! decided here.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UciMove(String);

impl UciMove {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let raw = raw.trim();
        let bytes = raw.as_bytes();
        if bytes.len() != 4 && bytes.len() != 5 {
            return Err(DomainError::parse(format!(
                "move must be 4 or 5 characters: {raw:?}"
            )));
        }
        if !is_square(&bytes[0..2]) || !is_square(&bytes[2..4]) {
            return Err(DomainError::parse(format!("invalid squares in move: {raw}")));
        }
        if bytes[0..2] == bytes[2..4] {
            return Err(DomainError::parse(format!("move does not change square: {raw}")));
        }
        if let Some(promo) = bytes.get(4) {
            if !matches!(promo, b'q' | b'r' | b'b' | b'n') {
                return Err(DomainError::parse(format!("invalid promotion piece: {raw}")));
            }
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn from_square(&self) -> &str {
        &self.0[0..2]
    }

    pub fn to_square(&self) -> &str {
        &self.0[2..4]
    }

    pub fn promotion(&self) -> Option<char> {
        self.0.chars().nth(4)
    }
}

fn is_square(pair: &[u8]) -> bool {
    matches!(pair, [file, rank] if (b'a'..=b'h').contains(file) && (b'1'..=b'8').contains(rank))
}

impl fmt::Display for UciMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for UciMove {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for UciMove {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<UciMove> for String {
    fn from(mv: UciMove) -> String {
        mv.0
    }
}
