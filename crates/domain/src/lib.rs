//! Chessroom Domain - the vocabulary shared by the session core, the wire
//! protocol and the persistence collaborator.
//!
//! No I/O and no async here: ids, sides, game lifecycle, clocks and move
//! notation only.

pub mod clock;
pub mod error;
pub mod game;
pub mod ids;
pub mod notation;
pub mod session;
pub mod side;

pub use clock::GameClock;
pub use error::DomainError;
pub use game::{EndReason, GameMode, GameOutcome, GameResult, GameStatus, TimeControl};
pub use ids::{ConnectionId, GameId, UserId};
pub use notation::UciMove;
pub use session::{MoveRecord, Seat, SessionSeed, STANDARD_START_FEN};
pub use side::{Role, Side};
