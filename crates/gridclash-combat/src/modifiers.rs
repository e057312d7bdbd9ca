//! Stat modifiers from equipment and terrain.

use gridclash_board::ItemType;
use serde::{Deserialize, Serialize};

/// Subtracted from the rolled stat of a combatant standing on ice.
pub const ICE_PENALTY: i32 = 2;

/// Additive changes an item applies while it is in the inventory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub attack: i32,
    pub defense: i32,
    pub speed: i32,
    /// Extra faces on the attack die.
    pub atk_dice: u32,
}

impl Modifiers {
    /// What a single item contributes. Markers and the flag contribute
    /// nothing.
    pub const fn of(item: ItemType) -> Self {
        let zero = Self {
            attack: 0,
            defense: 0,
            speed: 0,
            atk_dice: 0,
        };
        match item {
            ItemType::Greatsword => Self {
                attack: 2,
                defense: -1,
                ..zero
            },
            ItemType::Bulwark => Self {
                attack: -1,
                defense: 2,
                ..zero
            },
            ItemType::SwiftBoots => Self { speed: 1, ..zero },
            ItemType::LuckyCharm => Self { atk_dice: 2, ..zero },
            ItemType::RandomItem | ItemType::Spawn | ItemType::Flag => zero,
        }
    }

    /// Sum over an inventory.
    pub fn from_items<'a>(items: impl IntoIterator<Item = &'a ItemType>) -> Self {
        items.into_iter().fold(Self::default(), |acc, &item| {
            let m = Self::of(item);
            Self {
                attack: acc.attack + m.attack,
                defense: acc.defense + m.defense,
                speed: acc.speed + m.speed,
                atk_dice: acc.atk_dice + m.atk_dice,
            }
        })
    }
}

/// The four numbers a combat exchange reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatStats {
    pub attack: i32,
    pub defense: i32,
    pub atk_dice_max: u32,
    pub def_dice_max: u32,
}

impl CombatStats {
    /// Base stats with item modifiers applied.
    pub fn with_modifiers(self, m: Modifiers) -> Self {
        Self {
            attack: self.attack + m.attack,
            defense: self.defense + m.defense,
            atk_dice_max: self.atk_dice_max + m.atk_dice,
            def_dice_max: self.def_dice_max,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greatsword_and_bulwark_cancel_partially() {
        let m = Modifiers::from_items(&[ItemType::Greatsword, ItemType::Bulwark]);
        assert_eq!(m.attack, 1);
        assert_eq!(m.defense, 1);
        assert_eq!(m.speed, 0);
    }

    #[test]
    fn test_lucky_charm_widens_attack_die() {
        let base = CombatStats {
            attack: 4,
            defense: 4,
            atk_dice_max: 4,
            def_dice_max: 6,
        };
        let stats = base.with_modifiers(Modifiers::from_items(&[ItemType::LuckyCharm]));
        assert_eq!(stats.atk_dice_max, 6);
        assert_eq!(stats.def_dice_max, 6);
    }

    #[test]
    fn test_flag_has_no_effect() {
        assert_eq!(Modifiers::of(ItemType::Flag), Modifiers::default());
        assert_eq!(
            Modifiers::from_items(std::iter::empty::<&ItemType>()),
            Modifiers::default()
        );
    }
}
