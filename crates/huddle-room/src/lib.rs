//! Ephemeral rooms for Huddle.
//!
//! A room is a short-lived group identified by a short human-typable code.
//! Participants join with a display name, get a secret token and a public
//! id, and receive every membership change as an [`Event`] on their own
//! bounded mailbox. The creator (public id 0) may complete the room, after
//! which it lingers for a short grace period and is deleted.
//!
//! Each room runs as an isolated Tokio task (actor model), so operations on
//! one room are applied one at a time and broadcast in that same order.
//!
//! # Key types
//!
//! - [`RoomRegistry`]: creates, finds, and deletes rooms
//! - [`RoomHandle`]: send commands to a running room actor
//! - [`Subscription`]: a participant's live event stream
//! - [`RoomState`]: lifecycle state machine
//! - [`RegistryConfig`]: limits and lifetimes
//!
//! [`Event`]: huddle_protocol::Event

mod code;
mod config;
mod error;
mod mailbox;
mod registry;
mod room;

pub use code::{CODE_ALPHABET, RoomCodeGenerator};
pub use config::{RegistryConfig, RoomState};
pub use error::{ErrorKind, RoomError};
pub use mailbox::{EventSink, Subscription};
pub use registry::{CreatedRoom, RoomRegistry};
pub use room::{Joined, RoomHandle, RoomInfo};
