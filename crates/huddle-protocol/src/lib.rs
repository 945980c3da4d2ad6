//! Wire protocol for Huddle.
//!
//! This crate defines what clients and the server exchange:
//!
//! - **Identity** ([`RoomCode`], [`PublicId`], [`Token`]): how rooms and
//!   participants are named on the wire.
//! - **Events** ([`Event`]): the push feed every participant receives,
//!   discriminated by `message_type`.
//! - **Requests and responses** ([`Request`], [`Response`]): the operation
//!   table a client drives, wrapped in an [`Envelope`].
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): bytes in, types out.
//!
//! The protocol layer knows nothing about connections or room state. It
//! only describes shapes and how to serialize them.
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope) → Room registry (operations)
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    DisconnectReason, Envelope, Event, ParticipantInfo, Payload, PublicId,
    Request, Response, RoomCode, RoomSnapshot, Token,
};
