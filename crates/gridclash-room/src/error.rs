//! Error types for the room layer.

use gridclash_board::{BoardError, ItemType, Position};
use gridclash_combat::CombatError;
use gridclash_protocol::{ErrorCode, PlayerId, RoomId};

/// Structural errors: the request could not even reach the game.
///
/// Returned to the caller immediately (joins, leaves, kicks, room lookup).
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    #[error("room {0} not found")]
    NotFound(RoomId),

    #[error("room {0} is full")]
    RoomFull(RoomId),

    #[error("room {0} is locked")]
    RoomLocked(RoomId),

    #[error("player {0} already in room {1}")]
    AlreadyInRoom(PlayerId, RoomId),

    #[error("player {0} not in room {1}")]
    NotInRoom(PlayerId, RoomId),

    #[error("player {0} is not the room admin")]
    NotAdmin(PlayerId),

    #[error("avatar {0} is already taken")]
    AvatarTaken(u8),

    #[error("invalid map: {0}")]
    InvalidMap(String),

    /// The room is in a state that doesn't allow this operation.
    #[error("invalid room state for this operation: {0}")]
    InvalidState(String),

    /// The room's command channel is full or closed.
    #[error("room {0} is unavailable")]
    Unavailable(RoomId),
}

impl From<BoardError> for RoomError {
    fn from(err: BoardError) -> Self {
        Self::InvalidMap(err.to_string())
    }
}

impl RoomError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::RoomNotFound,
            Self::RoomFull(_) => ErrorCode::RoomFull,
            Self::RoomLocked(_) => ErrorCode::RoomLocked,
            Self::AlreadyInRoom(..) => ErrorCode::AlreadyInRoom,
            Self::NotInRoom(..) => ErrorCode::NotInRoom,
            Self::NotAdmin(_) => ErrorCode::NotAdmin,
            Self::AvatarTaken(_) => ErrorCode::AvatarTaken,
            Self::InvalidMap(_) => ErrorCode::InvalidMap,
            Self::InvalidState(_) => ErrorCode::InvalidState,
            Self::Unavailable(_) => ErrorCode::RoomUnavailable,
        }
    }
}

/// A game action that was refused. Nothing was changed; the sender gets an
/// `ActionRejected` event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("player {0} is not in this room")]
    UnknownPlayer(PlayerId),

    #[error("only the admin can do this")]
    NotAdmin,

    #[error("not allowed while the room is {0}")]
    InvalidState(String),

    #[error("it is not your turn")]
    NotYourTurn,

    #[error("cannot move to {0}")]
    IllegalMove(Position),

    #[error("{0} is out of reach")]
    OutOfRange(Position),

    #[error("no action points left")]
    NoActionPoints,

    #[error("an inventory decision is pending")]
    InventoryDecisionPending,

    #[error("no inventory decision is pending")]
    NoPendingDecision,

    #[error("{0:?} is neither held nor on offer")]
    NotInInventory(ItemType),

    #[error("avatar {0} is already taken")]
    AvatarTaken(u8),

    #[error("the room is full")]
    RoomFull,

    #[error("at least {0} players are needed")]
    NotEnoughPlayers(usize),

    #[error("the room must be locked first")]
    NotLocked,

    #[error("map cannot host this game: {0}")]
    InvalidMap(String),

    #[error(transparent)]
    Combat(#[from] CombatError),
}

impl ActionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownPlayer(_) => ErrorCode::NotInRoom,
            Self::NotAdmin => ErrorCode::NotAdmin,
            Self::InvalidState(_) | Self::NotLocked => ErrorCode::InvalidState,
            Self::NotYourTurn => ErrorCode::NotYourTurn,
            Self::IllegalMove(_) => ErrorCode::IllegalMove,
            Self::OutOfRange(_) => ErrorCode::OutOfRange,
            Self::NoActionPoints => ErrorCode::NoActionPoints,
            Self::InventoryDecisionPending => ErrorCode::InventoryDecisionPending,
            Self::NoPendingDecision => ErrorCode::NoPendingDecision,
            Self::NotInInventory(_) => ErrorCode::BadRequest,
            Self::AvatarTaken(_) => ErrorCode::AvatarTaken,
            Self::RoomFull => ErrorCode::RoomFull,
            Self::NotEnoughPlayers(_) => ErrorCode::NotEnoughPlayers,
            Self::InvalidMap(_) => ErrorCode::InvalidMap,
            Self::Combat(err) => err.code(),
        }
    }
}
