//! Port traits for infrastructure boundaries.
//!
//! These are the ONLY abstractions in the engine besides the session
//! participant seam. Ports exist for:
//! - Game persistence and identity (could swap SQLite -> Postgres)
//! - The move engine process (could swap UCI subprocess -> remote service)
//! - Clock (for testing)

mod engine;
mod error;
mod repos;
mod testing;

pub use engine::{EngineLauncher, EnginePosition, MoveEngine};
pub use error::{EngineError, RepoError};
pub use repos::{GameStore, IdentityPort};
pub use testing::ClockPort;

#[cfg(test)]
pub use engine::{MockEngineLauncher, MockMoveEngine};
#[cfg(test)]
pub use repos::{MockGameStore, MockIdentityPort};
#[cfg(test)]
pub use testing::MockClockPort;
