//! Game sessions.
//!
//! One [`Room`] actor per live game, reached only through its
//! [`RoomHandle`]. The [`Hub`] owns the id-to-room map.

pub mod bot;
pub mod command;
pub mod handle;
pub mod hub;
pub mod participant;
pub mod persistence;
pub mod room;
pub mod supervisor;

pub use command::{ParticipantSummary, RoomCommand, RoomSnapshot};
pub use handle::{RoomClosed, RoomHandle, SubmitError};
pub use hub::{Hub, HubError};
pub use participant::{DeliveryError, Frame, Participant};
pub use room::Room;
