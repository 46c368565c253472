//! Chessroom Engine library.
//!
//! This crate contains all server-side code for live chess games.
//!
//! ## Structure
//!
//! - `session/` - Room actors, the registry and engine-backed participants
//! - `infrastructure/` - External dependency implementations (ports + adapters)
//! - `api/` - HTTP and WebSocket entry points
//! - `app` - Application composition
//! - `config` - Environment configuration

pub mod api;
pub mod app;
pub mod config;
pub mod infrastructure;
pub mod session;

pub use app::App;
