//! Combat resolution for gridclash.
//!
//! A combat is a duel between two adjacent players. Combatants take turns,
//! the initiator first; on its turn a combatant either attacks (one dice
//! exchange) or tries to evade. The combat ends when someone drops to 0 HP,
//! when an evasion succeeds, or when the exchange budget runs out.
//!
//! ```text
//! attack_total  = attack  (+ items, −2 on ice) + d(atk_dice_max)
//! defense_total = defense (+ items, −2 on ice) + d(def_dice_max)
//! attack_total > defense_total  →  defender loses 1 HP
//! ```
//!
//! Everything here is synchronous. Randomness comes through the
//! [`DiceRoller`] trait so tests can script every roll.

mod combat;
mod dice;
mod error;
mod modifiers;

pub use combat::{
    Combat, CombatAction, CombatConfig, CombatEnd, CombatStep, EVASION_CHANCE, ExchangeRoll,
    Fighter, resolve_exchange,
};
pub use dice::{DiceRoller, RandomDice, ScriptedDice};
pub use error::CombatError;
pub use modifiers::{CombatStats, ICE_PENALTY, Modifiers};
