//! # Huddle
//!
//! Ephemeral multi-participant rooms over WebSocket.
//!
//! A client creates a room and gets back a short code to share. Others join
//! with that code and a display name. Everyone in the room can subscribe to
//! a live feed of who joined and who renamed themselves, and the creator
//! closes the room by completing it with a final payload. Rooms live for
//! five minutes, or ten seconds after completion, and are never persisted.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use huddle::prelude::*;
//!
//! # async fn start() -> Result<(), HuddleError> {
//! let server = HuddleServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod error;
mod handler;
mod server;

pub use error::HuddleError;
pub use server::{HuddleServer, HuddleServerBuilder};

/// Everything needed to run a server or drive the room layer directly.
pub mod prelude {
    pub use crate::{HuddleError, HuddleServer, HuddleServerBuilder};
    pub use huddle_protocol::{
        Codec, DisconnectReason, Envelope, Event, JsonCodec, ParticipantInfo, Payload, PublicId,
        Request, Response, RoomCode, RoomSnapshot, Token,
    };
    pub use huddle_room::{
        ErrorKind, EventSink, RegistryConfig, RoomError, RoomRegistry, RoomState, Subscription,
    };
}
