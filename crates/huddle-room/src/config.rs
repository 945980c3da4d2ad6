//! Registry limits and the room state machine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::RoomError;

// ---------------------------------------------------------------------------
// RegistryConfig
// ---------------------------------------------------------------------------

/// Limits and lifetimes applied by a [`RoomRegistry`](crate::RoomRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Maximum number of rooms alive at once.
    pub max_rooms: usize,

    /// Maximum participants per room, creator included.
    pub max_users: usize,

    /// Creation and completion payloads must be strictly shorter than this
    /// many bytes.
    pub max_info_len: usize,

    /// Number of characters in a room code.
    pub code_len: usize,

    /// Events buffered per participant before new ones are dropped.
    pub mailbox_capacity: usize,

    /// Lifetime of a freshly created room.
    pub room_ttl: Duration,

    /// Lifetime left to a room once it completes.
    pub completion_grace: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_rooms: 500,
            max_users: 20,
            max_info_len: 1024,
            code_len: 4,
            mailbox_capacity: 16,
            room_ttl: Duration::from_secs(5 * 60),
            completion_grace: Duration::from_secs(10),
        }
    }
}

impl RegistryConfig {
    /// Rejects limits the registry can't run with.
    ///
    /// Every count must be at least one: a zero mailbox capacity can't back
    /// a channel, and a zero code length yields the empty room code.
    pub fn validate(&self) -> Result<(), RoomError> {
        let limits = [
            ("max_rooms", self.max_rooms),
            ("max_users", self.max_users),
            ("max_info_len", self.max_info_len),
            ("code_len", self.code_len),
            ("mailbox_capacity", self.mailbox_capacity),
        ];
        match limits.into_iter().find(|(_, value)| *value == 0) {
            Some((name, _)) => Err(RoomError::InvalidConfig(format!("`{name}` must be at least 1"))),
            None => Ok(()),
        }
    }

    /// Rejects a creation or completion payload that is too long.
    pub fn check_info(&self, info: &str) -> Result<(), RoomError> {
        if info.len() >= self.max_info_len {
            return Err(RoomError::InfoTooLong {
                len: info.len(),
                max: self.max_info_len,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RoomState
// ---------------------------------------------------------------------------

/// The lifecycle state of a room.
///
/// Transitions only move forward:
///
/// ```text
/// Open → Locked → Complete
///   └─────────────↗
/// ```
///
/// - **Open**: accepting joins and renames.
/// - **Locked**: no new joins, renames still allowed. No operation moves a
///   room here today, but the join/rename rules already account for it.
/// - **Complete**: terminal. The completion info is set and the room is on
///   its short grace lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RoomState {
    Open,
    Locked,
    Complete,
}

impl RoomState {
    /// Returns `true` if new participants may join.
    pub fn is_joinable(self) -> bool {
        matches!(self, Self::Open)
    }

    /// Returns `true` if participants may change their names.
    pub fn is_renamable(self) -> bool {
        matches!(self, Self::Open | Self::Locked)
    }

    /// Returns `true` if the room may be completed.
    pub fn is_completable(self) -> bool {
        matches!(self, Self::Open | Self::Locked)
    }

    /// Returns `true` for the final state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Returns `true` if moving to `target` goes strictly forward.
    pub fn can_transition_to(self, target: Self) -> bool {
        target > self
    }
}

impl std::fmt::Display for RoomState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "Open"),
            Self::Locked => write!(f, "Locked"),
            Self::Complete => write!(f, "Complete"),
        }
    }
}
