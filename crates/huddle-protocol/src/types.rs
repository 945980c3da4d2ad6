//! Core protocol types for Huddle's wire format.
//!
//! Everything in this module is serialized onto the wire. The JSON shapes
//! are what browser clients parse, so the serde attributes here are part of
//! the public contract and are pinned by the tests at the bottom.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// The short, human-typable code that identifies a live room (e.g. `"K7QX"`).
///
/// Serialized as a bare string. Codes are only unique among rooms that are
/// currently registered; a code can come back after its room expired.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomCode(pub String);

impl RoomCode {
    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomCode {
    fn from(code: &str) -> Self {
        Self(code.to_string())
    }
}

/// A participant's public, sequential identifier within one room.
///
/// The creator is always `0`; every later join gets the next number.
/// Serialized as a plain number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublicId(pub u32);

impl PublicId {
    /// The room creator's id. Only this participant may complete the room.
    pub const CREATOR: PublicId = PublicId(0);

    /// Returns `true` if this id belongs to the room creator.
    pub fn is_creator(self) -> bool {
        self == Self::CREATOR
    }
}

impl fmt::Display for PublicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U{}", self.0)
    }
}

/// A participant's private capability token.
///
/// Possession of the token is the only authentication Huddle performs, so
/// it is never shown to anyone but its owner. `Debug` is written by hand to
/// keep the value out of logs.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    /// Wraps a raw token string.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the raw token string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(..)")
    }
}

// ---------------------------------------------------------------------------
// Events: the push feed
// ---------------------------------------------------------------------------

/// Why a participant's event stream was disconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisconnectReason {
    /// The room was deleted (expired, or torn down at shutdown).
    Closed,
    /// The same token subscribed again; the newer stream wins.
    Replaced,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => f.write_str("closed"),
            Self::Replaced => f.write_str("replaced"),
        }
    }
}

/// An event pushed to participants.
///
/// `#[serde(tag = "message_type")]` puts the discriminant inside the object,
/// so `UserAdded { id: 1, name: "Bea" }` becomes
/// `{"message_type":"user_added","id":1,"name":"Bea"}`. Every variant
/// carries it, which is what push transports key their frames on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "message_type", rename_all = "snake_case")]
pub enum Event {
    /// A participant joined. Also delivered to the participant who joined.
    UserAdded { id: PublicId, name: String },

    /// A participant changed their display name.
    UserRenamed { id: PublicId, name: String },

    /// The creator completed the room. Terminal.
    Complete { completion_info: String },

    /// The stream is over. Terminal.
    Disconnected { reason: DisconnectReason },
}

impl Event {
    /// The wire discriminant of this event.
    pub fn message_type(&self) -> &'static str {
        match self {
            Self::UserAdded { .. } => "user_added",
            Self::UserRenamed { .. } => "user_renamed",
            Self::Complete { .. } => "complete",
            Self::Disconnected { .. } => "disconnected",
        }
    }

    /// Returns `true` if a subscriber stream must end after this event.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Disconnected { .. })
    }
}

// ---------------------------------------------------------------------------
// Room snapshot
// ---------------------------------------------------------------------------

/// Public view of one participant. The token is deliberately absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub id: PublicId,
    pub name: String,
}

/// A point-in-time view of a room, returned by `room_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub id: RoomCode,
    /// Participants in join order.
    pub users: Vec<ParticipantInfo>,
    pub creation_info: String,
    /// Present only once the room is complete.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_info: Option<String>,
}

// ---------------------------------------------------------------------------
// Requests (client → server)
// ---------------------------------------------------------------------------

/// Operations a client can ask for.
///
/// Display names are optional on create and join (an empty name is
/// allowed); every other string field is mandatory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Open a new room and join it as the creator.
    CreateRoom {
        creation_info: String,
        #[serde(default)]
        name: String,
    },

    /// Join an existing room.
    JoinRoom {
        room: RoomCode,
        #[serde(default)]
        name: String,
    },

    /// Change the caller's display name.
    RenameUser {
        room: RoomCode,
        token: Token,
        name: String,
    },

    /// Mark the room complete. Creator only.
    CompleteRoom {
        room: RoomCode,
        token: Token,
        completion_info: String,
    },

    /// Fetch a snapshot of the room.
    RoomInfo { room: RoomCode, token: Token },

    /// Start streaming events for the caller's participant on this
    /// connection.
    Subscribe { room: RoomCode, token: Token },

    /// Ask for the server version.
    Version,
}

impl Request {
    /// Short name of the operation, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CreateRoom { .. } => "create_room",
            Self::JoinRoom { .. } => "join_room",
            Self::RenameUser { .. } => "rename_user",
            Self::CompleteRoom { .. } => "complete_room",
            Self::RoomInfo { .. } => "room_info",
            Self::Subscribe { .. } => "subscribe",
            Self::Version => "version",
        }
    }

    /// Checks that every mandatory field is present and non-empty.
    ///
    /// Length limits are not checked here; they are room policy and are
    /// enforced by the registry.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        match self {
            Self::CreateRoom { creation_info, .. } => {
                require("creation_info", creation_info.is_empty())
            }
            Self::JoinRoom { room, .. } => require("room", room.0.is_empty()),
            Self::RenameUser { room, token, name } => {
                require("room", room.0.is_empty())?;
                require("name", name.is_empty())?;
                require("token", token.is_empty())
            }
            Self::CompleteRoom {
                room,
                token,
                completion_info,
            } => {
                require("room", room.0.is_empty())?;
                require("completion_info", completion_info.is_empty())?;
                require("token", token.is_empty())
            }
            Self::RoomInfo { room, token } | Self::Subscribe { room, token } => {
                require("room", room.0.is_empty())?;
                require("token", token.is_empty())
            }
            Self::Version => Ok(()),
        }
    }
}

fn require(field: &str, missing: bool) -> Result<(), ProtocolError> {
    if missing {
        Err(ProtocolError::InvalidMessage(format!("`{field}` is mandatory")))
    } else {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Responses (server → client)
// ---------------------------------------------------------------------------

/// Replies to [`Request`]s, one per request, in request order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// The room was created and the caller joined it as creator.
    RoomCreated {
        room: RoomCode,
        user_id: PublicId,
        token: Token,
    },

    /// The caller joined. `info` is the room's creation info.
    RoomJoined {
        id: PublicId,
        token: Token,
        info: String,
    },

    /// The operation succeeded and has nothing to report.
    Ack,

    /// Snapshot of the room.
    RoomInfo { info: RoomSnapshot },

    /// Events for this participant will now arrive on this connection.
    Subscribed { room: RoomCode, user_id: PublicId },

    /// Server version.
    Version { version: String },

    /// The request failed. `code` follows HTTP conventions
    /// (400 bad request, 403 forbidden, 404 not found, 409 conflict).
    Error { code: u16, message: String },
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// What travels inside an [`Envelope`].
///
/// Adjacently tagged, so a frame is
/// `{"type":"Event","data":{"message_type":"complete",...}}` and a client
/// can tell replies from pushed events before looking any deeper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Payload {
    Request(Request),
    Response(Response),
    Event(Event),
}

/// The top-level wire frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Per-sender sequence number.
    pub seq: u64,
    /// Milliseconds since the connection was accepted (server frames) or an
    /// arbitrary client clock (client frames).
    #[serde(default)]
    pub timestamp: u64,
    pub payload: Payload,
}

// =========================================================================
// Tests
// =========================================================================
