//! Error types for the room layer.

use huddle_protocol::RoomCode;

use crate::RoomState;

/// Broad category of a [`RoomError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or oversized input.
    Validation,
    /// A room or participant limit was reached.
    Capacity,
    /// The operation isn't valid in the room's current state.
    State,
    /// Unknown token, or the caller lacks the privilege.
    Authorization,
    /// The room isn't registered (never existed, expired, or deleted).
    NotFound,
    /// The server couldn't do its part (e.g. no randomness available).
    Internal,
}

/// Errors that can occur during room operations.
///
/// A failed operation never changes room state.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// A registry limit is zero or otherwise unusable.
    #[error("invalid registry config: {0}")]
    InvalidConfig(String),

    /// Completion info is empty.
    #[error("completion info is mandatory")]
    InfoMissing,

    /// Creation or completion info is too long.
    #[error("info is {len} bytes, limit is {max}")]
    InfoTooLong { len: usize, max: usize },

    /// The registry already holds the maximum number of rooms.
    #[error("room limit of {0} reached")]
    TooManyRooms(usize),

    /// The room already has the maximum number of participants.
    #[error("room {0} is full")]
    RoomFull(RoomCode),

    /// Joins are only allowed while the room is Open.
    #[error("room {0} cannot be joined in state {1}")]
    RoomNotOpen(RoomCode, RoomState),

    /// A participant token couldn't be issued.
    #[error("failed to issue token: {0}")]
    TokenGenerationFailed(String),

    /// No participant in the room holds this token.
    #[error("token not found in room {0}")]
    TokenNotFound(RoomCode),

    /// Renames are only allowed while the room is Open or Locked.
    #[error("rename not allowed in room {0} in state {1}")]
    RenameNotAllowed(RoomCode, RoomState),

    /// The room was already completed.
    #[error("room {0} is already complete")]
    AlreadyComplete(RoomCode),

    /// The room can't be completed from its current state.
    #[error("room {0} cannot be completed in state {1}")]
    NotCompletable(RoomCode, RoomState),

    /// The caller's token is unknown, or it isn't the creator's.
    #[error("permission denied for room {0}")]
    PermissionDenied(RoomCode),

    /// The room does not exist.
    #[error("room {0} not found")]
    NotFound(RoomCode),
}

impl RoomError {
    /// The category this error falls into.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfig(_) | Self::InfoMissing | Self::InfoTooLong { .. } => {
                ErrorKind::Validation
            }
            Self::TooManyRooms(_) | Self::RoomFull(_) => ErrorKind::Capacity,
            Self::RoomNotOpen(..)
            | Self::RenameNotAllowed(..)
            | Self::AlreadyComplete(_)
            | Self::NotCompletable(..) => ErrorKind::State,
            Self::TokenNotFound(_) | Self::PermissionDenied(_) => ErrorKind::Authorization,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::TokenGenerationFailed(_) => ErrorKind::Internal,
        }
    }
}
