//! Dice: the single source of randomness for combat.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of dice rolls and coin flips.
///
/// Game code only sees this trait; rooms use [`RandomDice`], tests use
/// [`ScriptedDice`].
pub trait DiceRoller {
    /// A uniform roll in `1..=sides`. A die with 0 sides rolls 1.
    fn roll(&mut self, sides: u32) -> u32;

    /// `true` with probability `p`.
    fn chance(&mut self, p: f64) -> bool;
}

/// Dice backed by a seeded [`StdRng`].
#[derive(Debug)]
pub struct RandomDice {
    rng: StdRng,
}

impl RandomDice {
    /// Seeded from the thread-local generator.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_rng(&mut rand::rng()),
        }
    }

    /// Reproducible sequence for a given seed.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomDice {
    fn default() -> Self {
        Self::new()
    }
}

impl DiceRoller for RandomDice {
    fn roll(&mut self, sides: u32) -> u32 {
        self.rng.random_range(1..=sides.max(1))
    }

    fn chance(&mut self, p: f64) -> bool {
        self.rng.random_bool(p.clamp(0.0, 1.0))
    }
}

/// Replays a fixed list of outcomes.
///
/// Rolls are clamped to `1..=sides`. Once a queue runs dry, rolls return 1
/// and chances return `false`.
#[derive(Debug, Default, Clone)]
pub struct ScriptedDice {
    rolls: VecDeque<u32>,
    chances: VecDeque<bool>,
}

impl ScriptedDice {
    pub fn new(rolls: impl IntoIterator<Item = u32>) -> Self {
        Self {
            rolls: rolls.into_iter().collect(),
            chances: VecDeque::new(),
        }
    }

    pub fn with_chances(mut self, chances: impl IntoIterator<Item = bool>) -> Self {
        self.chances = chances.into_iter().collect();
        self
    }

    /// Rolls still queued.
    pub fn remaining_rolls(&self) -> usize {
        self.rolls.len()
    }
}

impl DiceRoller for ScriptedDice {
    fn roll(&mut self, sides: u32) -> u32 {
        self.rolls.pop_front().unwrap_or(1).clamp(1, sides.max(1))
    }

    fn chance(&mut self, _p: f64) -> bool {
        self.chances.pop_front().unwrap_or(false)
    }
}

impl<D: DiceRoller + ?Sized> DiceRoller for Box<D> {
    fn roll(&mut self, sides: u32) -> u32 {
        (**self).roll(sides)
    }

    fn chance(&mut self, p: f64) -> bool {
        (**self).chance(p)
    }
}
