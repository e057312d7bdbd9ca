//! Game statistics: counters kept during play and the summary sent when the
//! game ends.

use std::collections::{BTreeSet, HashSet};
use std::time::Duration;

use gridclash_board::{ItemType, Position};
use gridclash_protocol::PlayerId;
use serde::{Deserialize, Serialize};

/// Running per-player counters.
#[derive(Debug, Clone, Default)]
pub struct PlayerStats {
    pub combats: u32,
    pub wins: u32,
    pub losses: u32,
    pub evasions: u32,
    pub hp_lost: u32,
    pub damage_dealt: u32,
    pub items_collected: BTreeSet<ItemType>,
    pub tiles_visited: HashSet<Position>,
}

/// Running room-wide counters.
#[derive(Debug, Clone, Default)]
pub struct GlobalStats {
    /// Completed rotations.
    pub turns: u32,
    pub doors_toggled: HashSet<Position>,
    pub tiles_visited: HashSet<Position>,
    pub flag_holders: BTreeSet<PlayerId>,
}

/// One player's line in the end-of-game summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSummary {
    pub player_id: PlayerId,
    pub name: String,
    pub combats: u32,
    pub wins: u32,
    pub losses: u32,
    pub evasions: u32,
    pub hp_lost: u32,
    pub damage_dealt: u32,
    pub items_collected: usize,
    pub tiles_visited_pct: f64,
}

/// Sent with `GameEnded`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameStatistics {
    pub duration_secs: u64,
    pub turns: u32,
    pub doors_toggled_pct: f64,
    pub tiles_visited_pct: f64,
    pub flag_holders: usize,
    pub players: Vec<PlayerSummary>,
}

/// Share of `part` in `whole` as a percentage. 0 when `whole` is 0.
pub(crate) fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

impl GlobalStats {
    pub(crate) fn summarize(
        &self,
        duration: Duration,
        door_count: usize,
        walkable: usize,
        players: Vec<PlayerSummary>,
    ) -> GameStatistics {
        GameStatistics {
            duration_secs: duration.as_secs(),
            turns: self.turns,
            doors_toggled_pct: percent(self.doors_toggled.len(), door_count),
            tiles_visited_pct: percent(self.tiles_visited.len(), walkable),
            flag_holders: self.flag_holders.len(),
            players,
        }
    }
}
