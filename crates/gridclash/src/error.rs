//! Top-level error type for the server.

use gridclash_protocol::{ErrorCode, ProtocolError};
use gridclash_room::RoomError;

use crate::{AuthError, TransportError};

/// Wraps every crate-specific error so handlers can use `?` throughout.
#[derive(Debug, thiserror::Error)]
pub enum GridclashError {
    /// Connection, send, or receive failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Encode, decode, or protocol rule violation.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Full, locked, not found, and other room registry failures.
    #[error(transparent)]
    Room(#[from] RoomError),
}

impl GridclashError {
    /// The symbolic code a client sees for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Transport(_) => ErrorCode::BadRequest,
            Self::Protocol(err) => err.code(),
            Self::Auth(_) => ErrorCode::Unauthorized,
            Self::Room(err) => err.code(),
        }
    }
}
