//! Game lifecycle vocabulary: status, mode, time control and outcome.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::side::Side;

// =============================================================================
// Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    /// Created but at least one seat is still empty
    #[default]
    Waiting,
    Active,
    /// Terminal
    Finished,
}

impl GameStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GameStatus::Waiting => "waiting",
            GameStatus::Active => "active",
            GameStatus::Finished => "finished",
        }
    }

    /// Validate a lifecycle transition (`waiting -> active -> finished`).
    pub fn transition_to(self, next: GameStatus) -> Result<GameStatus, DomainError> {
        match (self, next) {
            (GameStatus::Waiting, GameStatus::Active)
            | (GameStatus::Active, GameStatus::Finished) => Ok(next),
            _ => Err(DomainError::invalid_state_transition(format!(
                "{} -> {}",
                self, next
            ))),
        }
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(GameStatus::Waiting),
            "active" => Ok(GameStatus::Active),
            "finished" => Ok(GameStatus::Finished),
            _ => Err(DomainError::parse(format!("Unknown game status: {}", s))),
        }
    }
}

// =============================================================================
// Mode
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    Bullet,
    Blitz,
    Rapid,
    /// One seat is played by the move engine
    Ai,
}

impl GameMode {
    pub fn as_str(self) -> &'static str {
        match self {
            GameMode::Bullet => "bullet",
            GameMode::Blitz => "blitz",
            GameMode::Rapid => "rapid",
            GameMode::Ai => "ai",
        }
    }

    pub fn is_ai(self) -> bool {
        matches!(self, GameMode::Ai)
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bullet" => Ok(GameMode::Bullet),
            "blitz" => Ok(GameMode::Blitz),
            "rapid" => Ok(GameMode::Rapid),
            "ai" => Ok(GameMode::Ai),
            _ => Err(DomainError::parse(format!("Unknown game mode: {}", s))),
        }
    }
}

// =============================================================================
// Time control
// =============================================================================

/// `<minutes>+<increment seconds>`, e.g. `5+0` or `3+2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeControl {
    pub base: Duration,
    pub increment: Duration,
}

impl TimeControl {
    pub fn new(base: Duration, increment: Duration) -> Self {
        Self { base, increment }
    }
}

impl Default for TimeControl {
    fn default() -> Self {
        Self::new(Duration::from_secs(600), Duration::ZERO)
    }
}

impl fmt::Display for TimeControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}+{}",
            self.base.as_secs() / 60,
            self.increment.as_secs()
        )
    }
}

impl FromStr for TimeControl {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (minutes, increment) = s
            .trim()
            .split_once('+')
            .ok_or_else(|| DomainError::parse(format!("Invalid time control: {}", s)))?;
        let minutes: u64 = minutes
            .parse()
            .map_err(|_| DomainError::parse(format!("Invalid time control minutes: {}", s)))?;
        let increment: u64 = increment
            .parse()
            .map_err(|_| DomainError::parse(format!("Invalid time control increment: {}", s)))?;
        if minutes == 0 {
            return Err(DomainError::validation(
                "time control base must be at least one minute",
            ));
        }
        Ok(Self::new(
            Duration::from_secs(minutes * 60),
            Duration::from_secs(increment),
        ))
    }
}

// =============================================================================
// Result
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameResult {
    WhiteWins,
    BlackWins,
    Draw,
}

impl GameResult {
    pub fn as_str(self) -> &'static str {
        match self {
            GameResult::WhiteWins => "1-0",
            GameResult::BlackWins => "0-1",
            GameResult::Draw => "1/2-1/2",
        }
    }

    pub fn won_by(side: Side) -> Self {
        match side {
            Side::White => GameResult::WhiteWins,
            Side::Black => GameResult::BlackWins,
        }
    }

    pub fn winner(self) -> Option<Side> {
        match self {
            GameResult::WhiteWins => Some(Side::White),
            GameResult::BlackWins => Some(Side::Black),
            GameResult::Draw => None,
        }
    }
}

impl fmt::Display for GameResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameResult {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1-0" => Ok(GameResult::WhiteWins),
            "0-1" => Ok(GameResult::BlackWins),
            "1/2-1/2" => Ok(GameResult::Draw),
            _ => Err(DomainError::parse(format!("Unknown game result: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndReason {
    Checkmate,
    Stalemate,
    Draw,
    Timeout,
    Resign,
}

impl EndReason {
    pub fn as_str(self) -> &'static str {
        match self {
            EndReason::Checkmate => "checkmate",
            EndReason::Stalemate => "stalemate",
            EndReason::Draw => "draw",
            EndReason::Timeout => "timeout",
            EndReason::Resign => "resign",
        }
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EndReason {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "checkmate" => Ok(EndReason::Checkmate),
            "stalemate" => Ok(EndReason::Stalemate),
            "draw" => Ok(EndReason::Draw),
            "timeout" => Ok(EndReason::Timeout),
            "resign" => Ok(EndReason::Resign),
            _ => Err(DomainError::parse(format!("Unknown end reason: {}", s))),
        }
    }
}

/// How a game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameOutcome {
    pub result: GameResult,
    pub reason: EndReason,
}

impl GameOutcome {
    pub fn new(result: GameResult, reason: EndReason) -> Self {
        Self { result, reason }
    }

    /// The outcome when `flagged` ran out of time.
    pub fn timeout(flagged: Side) -> Self {
        Self::new(GameResult::won_by(flagged.opponent()), EndReason::Timeout)
    }

    /// Parse the wire fields of a `game_over` report.
    ///
    /// An empty `winner` is treated as absent. When present it must agree with
    /// `result`; a draw never has a winner.
    pub fn from_report(
        result: &str,
        reason: &str,
        winner: Option<&str>,
    ) -> Result<Self, DomainError> {
        let result: GameResult = result.parse()?;
        let reason: EndReason = reason.parse()?;
        let winner = match winner.filter(|w| !w.is_empty()) {
            Some(w) => Some(w.parse::<Side>()?),
            None => None,
        };
        if winner.is_some() && winner != result.winner() {
            return Err(DomainError::validation(format!(
                "winner does not match result {}",
                result
            )));
        }
        Ok(Self::new(result, reason))
    }

    pub fn winner(&self) -> Option<Side> {
        self.result.winner()
    }
}
