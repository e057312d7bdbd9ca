//! Player records kept by a game session.

use gridclash_board::{ItemType, Position};
use gridclash_combat::{CombatStats, Modifiers};
use gridclash_protocol::{AttributeBonus, DiceBonus, PlayerId, PlayerProfile};
use serde::{Deserialize, Serialize};

use crate::stats::PlayerStats;

/// Items a player can carry at once.
pub const INVENTORY_CAPACITY: usize = 2;

const BASE_STAT: u32 = 4;
const PROFILE_BONUS: u32 = 2;
const SMALL_DIE: u32 = 4;
const LARGE_DIE: u32 = 6;

/// Role or connection state of a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlayerStatus {
    Player,
    Admin,
    Bot,
    /// Left mid-game. Kept for statistics, skipped by the rotation.
    Disconnected,
}

/// Base numbers before item modifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes {
    pub total_hp: u32,
    pub current_hp: u32,
    pub speed: u32,
    pub movement_points_left: u32,
    pub max_action_points: u32,
    pub action_points: u32,
    pub attack: i32,
    pub atk_dice_max: u32,
    pub defense: i32,
    pub def_dice_max: u32,
}

impl Attributes {
    /// Base 4 everywhere, +2 on the chosen attribute, D6 on the chosen roll.
    pub fn from_profile(bonus: AttributeBonus, dice: DiceBonus) -> Self {
        let (hp, speed) = match bonus {
            AttributeBonus::Hp => (BASE_STAT + PROFILE_BONUS, BASE_STAT),
            AttributeBonus::Speed => (BASE_STAT, BASE_STAT + PROFILE_BONUS),
        };
        let (atk_dice_max, def_dice_max) = match dice {
            DiceBonus::Attack => (LARGE_DIE, SMALL_DIE),
            DiceBonus::Defense => (SMALL_DIE, LARGE_DIE),
        };
        Self {
            total_hp: hp,
            current_hp: hp,
            speed,
            movement_points_left: 0,
            max_action_points: 1,
            action_points: 0,
            attack: BASE_STAT as i32,
            atk_dice_max,
            defense: BASE_STAT as i32,
            def_dice_max,
        }
    }
}

/// An item the player stepped on with a full inventory. The item stays on
/// the grid at `position` until the player decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPickup {
    pub item: ItemType,
    pub position: Position,
}

/// A seat in a room.
#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub avatar: u8,
    pub status: PlayerStatus,
    pub position: Position,
    pub spawn_position: Position,
    pub attributes: Attributes,
    pub inventory: Vec<ItemType>,
    pub pending: Option<PendingPickup>,
    /// Combat victories this game.
    pub wins: u32,
    pub history: Vec<Position>,
    pub stats: PlayerStats,
}

impl Player {
    pub fn new(id: PlayerId, profile: PlayerProfile, status: PlayerStatus) -> Self {
        Self {
            id,
            name: profile.name,
            avatar: profile.avatar,
            status,
            position: Position::OFF_BOARD,
            spawn_position: Position::OFF_BOARD,
            attributes: Attributes::from_profile(profile.bonus, profile.dice),
            inventory: Vec::with_capacity(INVENTORY_CAPACITY),
            pending: None,
            wins: 0,
            history: Vec::new(),
            stats: PlayerStats::default(),
        }
    }

    pub fn is_bot(&self) -> bool {
        self.status == PlayerStatus::Bot
    }

    pub fn is_connected(&self) -> bool {
        self.status != PlayerStatus::Disconnected
    }

    /// Connected and not a bot.
    pub fn is_human(&self) -> bool {
        matches!(self.status, PlayerStatus::Player | PlayerStatus::Admin)
    }

    pub fn inventory_full(&self) -> bool {
        self.inventory.len() >= INVENTORY_CAPACITY
    }

    pub fn holds(&self, item: ItemType) -> bool {
        self.inventory.contains(&item)
    }

    pub fn modifiers(&self) -> Modifiers {
        Modifiers::from_items(&self.inventory)
    }

    /// Speed including equipment.
    pub fn speed(&self) -> u32 {
        let speed = self.attributes.speed as i32 + self.modifiers().speed;
        speed.max(0) as u32
    }

    pub fn combat_stats(&self) -> CombatStats {
        CombatStats {
            attack: self.attributes.attack,
            defense: self.attributes.defense,
            atk_dice_max: self.attributes.atk_dice_max,
            def_dice_max: self.attributes.def_dice_max,
        }
        .with_modifiers(self.modifiers())
    }

    /// Refills movement and action points for a new turn.
    pub fn replenish(&mut self) {
        self.attributes.movement_points_left = self.speed();
        self.attributes.action_points = self.attributes.max_action_points;
    }

    /// Keeps movement points within speed after an item changed it.
    pub fn clamp_movement(&mut self) {
        let speed = self.speed();
        if self.attributes.movement_points_left > speed {
            self.attributes.movement_points_left = speed;
        }
    }

    pub fn restore_hp(&mut self) {
        self.attributes.current_hp = self.attributes.total_hp;
    }

    /// Moves the player and records the step.
    pub fn place(&mut self, position: Position) {
        self.position = position;
        self.history.push(position);
        self.stats.tiles_visited.insert(position);
    }
}
