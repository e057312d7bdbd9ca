//! Core protocol types for gridclash's wire format.
//!
//! Everything here travels "on the wire": identities, grid coordinates,
//! the grid exchange format, player profiles, framework-level system
//! messages, and the envelope that wraps every message.
//!
//! Game actions and events (move, attack, turn changes, ...) are defined by
//! the room layer and travel as opaque [`Payload::Game`] bytes.

use serde::{Deserialize, Serialize};

use std::fmt;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a player.
///
/// Newtype over `u64` so a `RoomId` can never be passed where a player is
/// expected. `#[serde(transparent)]` keeps the wire form a plain number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

/// A unique identifier for a room (one game instance).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub u64);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// A cell on the grid, addressed as `tiles[row][col]`.
///
/// Coordinates are signed so that out-of-bounds queries and the
/// [`Position::OFF_BOARD`] sentinel are representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub row: i32,
    pub col: i32,
}

impl Position {
    /// Where disconnected players are parked. Never inside any grid.
    pub const OFF_BOARD: Position = Position { row: -1, col: -1 };

    pub const fn new(row: i32, col: i32) -> Self {
        Self { row, col }
    }

    /// Whether the position lies inside a square grid of `size` cells per side.
    pub fn in_bounds(self, size: usize) -> bool {
        self.row >= 0 && self.col >= 0 && (self.row as usize) < size && (self.col as usize) < size
    }

    /// Manhattan distance between two positions.
    pub fn distance(self, other: Position) -> u32 {
        self.row.abs_diff(other.row) + self.col.abs_diff(other.col)
    }

    /// `true` when the two positions share an edge.
    pub fn is_adjacent(self, other: Position) -> bool {
        self.distance(other) == 1
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

// ---------------------------------------------------------------------------
// Recipient
// ---------------------------------------------------------------------------

/// Specifies who should receive a server message.
///
/// Room logic returns `(Recipient, ServerEvent)` pairs; the room actor uses
/// this to fan each event out to the right connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    /// Every player in the room.
    All,
    /// One specific player.
    Player(PlayerId),
    /// Everyone except the given player.
    AllExcept(PlayerId),
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// The delivery guarantee requested for a message.
///
/// A turn-based game sends everything reliably; `Unreliable` exists for
/// cosmetic traffic a client may choose to drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub enum Channel {
    #[default]
    ReliableOrdered,
    ReliableUnordered,
    Unreliable,
}

// ---------------------------------------------------------------------------
// Grid exchange format
// ---------------------------------------------------------------------------

/// The grid as it travels on the wire: two square integer matrices
/// (tile codes and item codes) plus their dimension.
///
/// The board layer validates and decodes these codes; the protocol only
/// carries them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridCodes {
    pub size: usize,
    pub tiles: Vec<Vec<u8>>,
    pub items: Vec<Vec<u8>>,
}

/// Which victory rule a room plays with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum GameMode {
    /// First player to reach the configured number of combat wins.
    #[default]
    Classic,
    /// A player holding the flag when a round completes wins.
    CaptureTheFlag,
}

// ---------------------------------------------------------------------------
// Player profile
// ---------------------------------------------------------------------------

/// Which base attribute receives the +2 bonus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum AttributeBonus {
    #[default]
    Hp,
    Speed,
}

/// Which roll uses the six-sided die (the other one uses a four-sided die).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum DiceBonus {
    #[default]
    Attack,
    Defense,
}

/// What a player chooses before entering a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub name: String,
    pub avatar: u8,
    #[serde(default)]
    pub bonus: AttributeBonus,
    #[serde(default)]
    pub dice: DiceBonus,
}

// ---------------------------------------------------------------------------
// Error codes
// ---------------------------------------------------------------------------

/// Symbolic error codes surfaced to clients.
///
/// These serialize as camelCase strings (`"roomNotFound"`, `"roomLocked"`)
/// rather than numbers: there is no process exit code at this boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCode {
    BadRequest,
    Unauthorized,
    VersionMismatch,
    RoomNotFound,
    RoomLocked,
    RoomFull,
    RoomUnavailable,
    AlreadyInRoom,
    NotInRoom,
    NotAdmin,
    InvalidMap,
    InvalidState,
    AvatarTaken,
    NotEnoughPlayers,
    NotYourTurn,
    IllegalMove,
    OutOfRange,
    NoActionPoints,
    InventoryDecisionPending,
    NoPendingDecision,
    NotInCombat,
    NoEvasionLeft,
}

impl ErrorCode {
    /// The wire spelling of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadRequest => "badRequest",
            Self::Unauthorized => "unauthorized",
            Self::VersionMismatch => "versionMismatch",
            Self::RoomNotFound => "roomNotFound",
            Self::RoomLocked => "roomLocked",
            Self::RoomFull => "roomFull",
            Self::RoomUnavailable => "roomUnavailable",
            Self::AlreadyInRoom => "alreadyInRoom",
            Self::NotInRoom => "notInRoom",
            Self::NotAdmin => "notAdmin",
            Self::InvalidMap => "invalidMap",
            Self::InvalidState => "invalidState",
            Self::AvatarTaken => "avatarTaken",
            Self::NotEnoughPlayers => "notEnoughPlayers",
            Self::NotYourTurn => "notYourTurn",
            Self::IllegalMove => "illegalMove",
            Self::OutOfRange => "outOfRange",
            Self::NoActionPoints => "noActionPoints",
            Self::InventoryDecisionPending => "inventoryDecisionPending",
            Self::NoPendingDecision => "noPendingDecision",
            Self::NotInCombat => "notInCombat",
            Self::NoEvasionLeft => "noEvasionLeft",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// SystemMessage
// ---------------------------------------------------------------------------

/// A summary of a room returned in room listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomListEntry {
    pub room_id: RoomId,
    pub player_count: usize,
    pub max_players: usize,
    pub locked: bool,
}

/// Framework-level messages: connection lifecycle, heartbeats, and the
/// room registry operations (create, join, leave, kick, list).
///
/// Everything that happens *inside* a room is a game message instead.
/// Internally tagged: `{ "type": "JoinRoom", "room_id": 3, ... }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SystemMessage {
    // -- Connection lifecycle --
    /// Client → Server: protocol version and an auth token for the
    /// external account service.
    Handshake { version: u32, token: Option<String> },

    /// Server → Client: the authenticated identity.
    HandshakeAck { player_id: PlayerId, server_time: u64 },

    /// Either direction: "I'm disconnecting."
    Disconnect { reason: String },

    // -- Heartbeat --
    Heartbeat { client_time: u64 },
    HeartbeatAck { client_time: u64, server_time: u64 },

    // -- Room registry --
    /// Client → Server: create a room on the given map. The creator joins
    /// it as admin with `profile`.
    CreateRoom {
        map: GridCodes,
        #[serde(default)]
        mode: GameMode,
        profile: PlayerProfile,
    },

    /// Server → Client: the room exists and the creator is its admin.
    RoomCreated { room_id: RoomId },

    /// Client → Server: join an existing room's lobby.
    JoinRoom { room_id: RoomId, profile: PlayerProfile },

    /// Server → Client: join accepted.
    RoomJoined { room_id: RoomId },

    /// Client → Server: leave the current room (a disconnect if the game
    /// has started).
    LeaveRoom,

    /// Client → Server: admin removes a player from the lobby.
    KickPlayer { player_id: PlayerId },

    /// Server → Client: you were removed from the room, or it was closed.
    RoomClosed { room_id: RoomId, reason: String },

    ListRooms,
    RoomList { rooms: Vec<RoomListEntry> },

    // -- Errors --
    /// Server → Client: a structural error (room not found, locked, ...).
    Error { code: ErrorCode, message: String },
}

// ---------------------------------------------------------------------------
// Payload / Envelope
// ---------------------------------------------------------------------------

/// The content of a message: either a system message or game data.
///
/// Adjacently tagged: `{ "type": "System", "data": { ... } }` or
/// `{ "type": "Game", "data": [..bytes..] }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Payload {
    System(SystemMessage),
    /// A game action or event, encoded by the room layer's codec.
    Game(Vec<u8>),
}

/// The top-level wire message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Per-direction sequence number.
    pub seq: u64,
    /// Milliseconds since the sender's connection started.
    pub timestamp: u64,
    #[serde(default)]
    pub channel: Channel,
    pub payload: Payload,
}

// =========================================================================
// Tests
// =========================================================================
