//! Room configuration and the room status machine.

use gridclash_combat::CombatConfig;
use gridclash_protocol::GameMode;
use gridclash_timer::TimerConfig;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RoomConfig
// ---------------------------------------------------------------------------

/// Configuration for one room.
///
/// The player limit depends on the map; build a config with
/// [`RoomConfig::sized_for`] once the map is known.
#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// Players needed before the admin may start.
    pub min_players: usize,

    /// Seats in the room. The room locks itself when they are all taken.
    pub max_players: usize,

    /// Seconds per turn.
    pub turn_secs: u32,

    /// Combat wins needed for a Classic victory.
    pub win_threshold: u32,

    pub mode: GameMode,

    /// Bounded command channel of the room actor.
    pub channel_size: usize,

    pub combat: CombatConfig,

    pub timer: TimerConfig,

    /// Fixed seed for dice and item draws. `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            min_players: 2,
            max_players: 2,
            turn_secs: 30,
            win_threshold: 3,
            mode: GameMode::Classic,
            channel_size: 64,
            combat: CombatConfig::default(),
            timer: TimerConfig::default(),
            seed: None,
        }
    }
}

impl RoomConfig {
    /// Seats for a map of `size × size` tiles: small maps seat 2,
    /// medium 4, large 6.
    pub fn capacity_for(size: usize) -> usize {
        match size {
            0..=10 => 2,
            11..=15 => 4,
            _ => 6,
        }
    }

    /// Sets the player limit from the map size.
    pub fn sized_for(mut self, size: usize) -> Self {
        self.max_players = Self::capacity_for(size);
        self
    }

    pub fn with_mode(mut self, mode: GameMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_turn_secs(mut self, secs: u32) -> Self {
        self.turn_secs = secs.max(1);
        self
    }

    pub fn with_win_threshold(mut self, wins: u32) -> Self {
        self.win_threshold = wins.max(1);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_combat(mut self, combat: CombatConfig) -> Self {
        self.combat = combat;
        self
    }
}

// ---------------------------------------------------------------------------
// RoomStatus
// ---------------------------------------------------------------------------

/// Where a room is in its lifecycle.
///
/// ```text
/// Lobby → Playing ⇄ Combat
///            │         │
///            └────┬────┘
///                 ↓
///             PostGame
/// ```
///
/// - **Lobby**: players gather, pick avatars; the admin locks and starts.
/// - **Playing**: turns rotate; the turn timer runs.
/// - **Combat**: two players duel; the turn timer is paused.
/// - **PostGame**: a winner is known; only reads are served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RoomStatus {
    Lobby,
    Playing,
    Combat,
    PostGame,
}

impl RoomStatus {
    pub fn is_joinable(&self) -> bool {
        matches!(self, Self::Lobby)
    }

    /// A game is underway (turns or a combat).
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Playing | Self::Combat)
    }

    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Lobby, Self::Playing)
                | (Self::Playing, Self::Combat)
                | (Self::Combat, Self::Playing)
                | (Self::Playing | Self::Combat, Self::PostGame)
        )
    }
}

impl std::fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lobby => write!(f, "Lobby"),
            Self::Playing => write!(f, "Playing"),
            Self::Combat => write!(f, "Combat"),
            Self::PostGame => write!(f, "PostGame"),
        }
    }
}
