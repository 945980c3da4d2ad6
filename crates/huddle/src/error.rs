//! Unified error type for the Huddle server.

use huddle_protocol::ProtocolError;
use huddle_room::RoomError;
use huddle_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant generates the `From` impls, so
/// `?` converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum HuddleError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A room-level error (full, not found, wrong state, not allowed).
    #[error(transparent)]
    Room(#[from] RoomError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_protocol::RoomCode;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let huddle_err: HuddleError = err.into();
        assert!(matches!(huddle_err, HuddleError::Transport(_)));
        assert!(huddle_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let huddle_err: HuddleError = err.into();
        assert!(matches!(huddle_err, HuddleError::Protocol(_)));
    }

    #[test]
    fn test_from_room_error() {
        let err = RoomError::NotFound(RoomCode::from("K7QX"));
        let huddle_err: HuddleError = err.into();
        assert!(matches!(huddle_err, HuddleError::Room(_)));
        assert_eq!(huddle_err.to_string(), "room K7QX not found");
    }
}
