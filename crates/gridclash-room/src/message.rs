//! Game-level messages: what players ask a room to do and what the room
//! tells them back.
//!
//! Both travel inside [`Payload::Game`](gridclash_protocol::Payload) and are
//! internally tagged: `{ "type": "MoveTo", "destination": { "row": 1, "col": 2 } }`.

use gridclash_board::{Grid, ItemType, Position, TileType};
use gridclash_combat::{CombatAction, CombatEnd};
use gridclash_protocol::{ErrorCode, GameMode, PlayerId, RoomId};
use gridclash_timer::TimerRole;
use serde::{Deserialize, Serialize};

use crate::player::{Attributes, PlayerStatus};
use crate::{GameStatistics, RoomStatus};

/// Player → room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientAction {
    // -- Lobby --
    LockRoom,
    UnlockRoom,
    SelectAvatar { avatar: u8 },
    AddBot,
    StartGame,

    // -- Turn --
    MoveTo { destination: Position },
    /// Opens or closes the door at `position`.
    ToggleDoor { position: Position },
    StartCombat { target: PlayerId },
    ResolveInventory { drop: ItemType },
    EndTurn,

    // -- Combat --
    Attack,
    AttemptEvasion,
}

/// Public view of one player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerView {
    pub id: PlayerId,
    pub name: String,
    pub avatar: u8,
    pub status: PlayerStatus,
    pub position: Position,
    pub spawn_position: Position,
    pub attributes: Attributes,
    pub inventory: Vec<ItemType>,
    pub wins: u32,
}

/// Everything a client needs to draw a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub status: RoomStatus,
    pub locked: bool,
    pub admin: PlayerId,
    pub max_players: usize,
    pub mode: GameMode,
    pub grid: Grid,
    /// Join order.
    pub players: Vec<PlayerView>,
    pub active_player: Option<PlayerId>,
}

/// Room → player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    // -- Lobby --
    RoomUpdated {
        snapshot: RoomSnapshot,
    },
    PlayerKicked {
        player_id: PlayerId,
    },
    RoomClosed {
        reason: String,
    },

    // -- Game flow --
    GameStarted {
        snapshot: RoomSnapshot,
    },
    TurnChanged {
        player_id: PlayerId,
        turn_secs: u32,
        /// Completed rotations so far.
        turns: u32,
    },
    TimerTick {
        role: TimerRole,
        remaining: i64,
    },
    PlayerMoved {
        player_id: PlayerId,
        /// Tiles entered, in order.
        path: Vec<Position>,
        movement_points_left: u32,
    },
    DoorToggled {
        player_id: PlayerId,
        position: Position,
        tile: TileType,
    },
    PlayerDisconnected {
        player_id: PlayerId,
    },

    // -- Items --
    ItemPickedUp {
        player_id: PlayerId,
        item: ItemType,
        position: Position,
    },
    /// Sent to the player only: choose what to drop (`incoming` included).
    InventoryDecisionRequired {
        incoming: ItemType,
        inventory: Vec<ItemType>,
    },
    InventoryResolved {
        player_id: PlayerId,
        inventory: Vec<ItemType>,
        /// The item left on the ground.
        dropped: ItemType,
        position: Position,
    },
    ItemsDropped {
        player_id: PlayerId,
        items: Vec<(ItemType, Position)>,
    },

    // -- Combat --
    CombatStarted {
        initiator: PlayerId,
        target: PlayerId,
        turn_secs: u32,
    },
    CombatExchange {
        action: CombatAction,
        /// `true` when the timer ran out and the attack was automatic.
        forced: bool,
        /// Who acts next, unless the combat just ended.
        next: Option<PlayerId>,
        turn_secs: u32,
    },
    CombatEnded {
        outcome: CombatEnd,
    },
    PlayerEliminated {
        player_id: PlayerId,
        respawn: Position,
    },

    // -- End --
    GameEnded {
        winner: Option<PlayerId>,
        statistics: GameStatistics,
    },

    /// Sent to the requester only.
    ActionRejected {
        code: ErrorCode,
        reason: String,
    },
}
