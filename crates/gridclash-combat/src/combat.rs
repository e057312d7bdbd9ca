//! The combat state machine and a single dice exchange.

use gridclash_protocol::PlayerId;
use serde::{Deserialize, Serialize};

use crate::{CombatError, CombatStats, DiceRoller, ICE_PENALTY};

/// Probability that an evasion attempt ends the combat.
pub const EVASION_CHANCE: f64 = 0.4;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Combat tuning.
#[derive(Debug, Clone)]
pub struct CombatConfig {
    /// Decision window for a combatant who can still evade.
    pub exchange_secs: u32,
    /// Decision window once evasions are used up.
    pub exchange_secs_no_evasion: u32,
    /// Actions (attacks and failed evasions) before the combat is called a
    /// draw.
    pub max_exchanges: u32,
    /// Evasion attempts per combatant per combat.
    pub evasions: u8,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            exchange_secs: 5,
            exchange_secs_no_evasion: 3,
            max_exchanges: 40,
            evasions: 2,
        }
    }
}

impl CombatConfig {
    pub fn with_max_exchanges(mut self, max: u32) -> Self {
        self.max_exchanges = max.max(1);
        self
    }

    pub fn with_evasions(mut self, evasions: u8) -> Self {
        self.evasions = evasions;
        self
    }
}

// ---------------------------------------------------------------------------
// Fighter / exchange
// ---------------------------------------------------------------------------

/// One side of a combat: a snapshot of the player's combat-relevant state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fighter {
    pub id: PlayerId,
    pub hp: u32,
    pub stats: CombatStats,
    /// Standing on ice: −2 to whichever stat this fighter rolls.
    pub on_ice: bool,
    pub evasions_left: u8,
}

impl Fighter {
    pub fn new(id: PlayerId, hp: u32, stats: CombatStats, on_ice: bool) -> Self {
        Self {
            id,
            hp,
            stats,
            on_ice,
            evasions_left: 0,
        }
    }

    fn terrain_penalty(&self) -> i32 {
        if self.on_ice { ICE_PENALTY } else { 0 }
    }

    fn effective_attack(&self) -> i32 {
        self.stats.attack - self.terrain_penalty()
    }

    fn effective_defense(&self) -> i32 {
        self.stats.defense - self.terrain_penalty()
    }
}

/// The outcome of one attack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRoll {
    pub attacker: PlayerId,
    pub defender: PlayerId,
    pub attack_roll: u32,
    pub defense_roll: u32,
    pub attack_total: i32,
    pub defense_total: i32,
    /// Whether the defender lost a hit point. Ties favor the defender.
    pub hit: bool,
    /// Defender HP after the exchange.
    pub defender_hp: u32,
}

/// Rolls one exchange and applies its damage to `defender`.
///
/// The attack die is rolled before the defense die.
pub fn resolve_exchange(
    attacker: &Fighter,
    defender: &mut Fighter,
    dice: &mut impl DiceRoller,
) -> ExchangeRoll {
    let attack_roll = dice.roll(attacker.stats.atk_dice_max);
    let defense_roll = dice.roll(defender.stats.def_dice_max);
    let attack_total = attacker.effective_attack() + attack_roll as i32;
    let defense_total = defender.effective_defense() + defense_roll as i32;

    let hit = attack_total > defense_total;
    if hit {
        defender.hp = defender.hp.saturating_sub(1);
    }

    ExchangeRoll {
        attacker: attacker.id,
        defender: defender.id,
        attack_roll,
        defense_roll,
        attack_total,
        defense_total,
        hit,
        defender_hp: defender.hp,
    }
}

// ---------------------------------------------------------------------------
// Combat
// ---------------------------------------------------------------------------

/// How a combat finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CombatEnd {
    /// `loser` reached 0 HP or left the game.
    Victory { winner: PlayerId, loser: PlayerId },
    /// `by` got away. Nobody wins.
    Evaded { by: PlayerId },
    /// Exchange budget exhausted.
    Draw,
}

impl CombatEnd {
    pub fn winner(&self) -> Option<PlayerId> {
        match self {
            Self::Victory { winner, .. } => Some(*winner),
            _ => None,
        }
    }
}

/// What a combatant did on its turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CombatAction {
    Attack(ExchangeRoll),
    Evasion {
        by: PlayerId,
        success: bool,
        attempts_left: u8,
    },
}

/// Result of one combat action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombatStep {
    pub action: CombatAction,
    /// Set when this action ended the combat.
    pub end: Option<CombatEnd>,
}

/// A running duel. Lives only while the room is in combat.
#[derive(Debug, Clone)]
pub struct Combat {
    config: CombatConfig,
    /// `[initiator, target]`.
    fighters: [Fighter; 2],
    active: usize,
    exchanges: u32,
    outcome: Option<CombatEnd>,
}

impl Combat {
    /// Starts a combat. The initiator acts first.
    pub fn new(mut initiator: Fighter, mut target: Fighter, config: CombatConfig) -> Self {
        initiator.evasions_left = config.evasions;
        target.evasions_left = config.evasions;
        tracing::debug!(
            initiator = %initiator.id,
            target = %target.id,
            "combat engaged"
        );
        Self {
            config,
            fighters: [initiator, target],
            active: 0,
            exchanges: 0,
            outcome: None,
        }
    }

    pub fn initiator(&self) -> &Fighter {
        &self.fighters[0]
    }

    pub fn target(&self) -> &Fighter {
        &self.fighters[1]
    }

    pub fn fighters(&self) -> &[Fighter; 2] {
        &self.fighters
    }

    pub fn fighter(&self, id: PlayerId) -> Option<&Fighter> {
        self.fighters.iter().find(|f| f.id == id)
    }

    pub fn involves(&self, id: PlayerId) -> bool {
        self.fighter(id).is_some()
    }

    pub fn opponent_of(&self, id: PlayerId) -> Option<PlayerId> {
        self.index_of(id).map(|i| self.fighters[1 - i].id)
    }

    /// The combatant whose decision is awaited.
    pub fn active(&self) -> PlayerId {
        self.fighters[self.active].id
    }

    pub fn exchanges(&self) -> u32 {
        self.exchanges
    }

    pub fn outcome(&self) -> Option<CombatEnd> {
        self.outcome
    }

    pub fn is_over(&self) -> bool {
        self.outcome.is_some()
    }

    /// Length of the active combatant's decision window.
    pub fn turn_secs(&self) -> u32 {
        if self.fighters[self.active].evasions_left > 0 {
            self.config.exchange_secs
        } else {
            self.config.exchange_secs_no_evasion
        }
    }

    /// `actor` attacks its opponent.
    pub fn attack(
        &mut self,
        actor: PlayerId,
        dice: &mut impl DiceRoller,
    ) -> Result<CombatStep, CombatError> {
        let a = self.check_turn(actor)?;
        let [first, second] = &mut self.fighters;
        let (attacker, defender) = if a == 0 { (first, second) } else { (second, first) };
        let roll = resolve_exchange(attacker, defender, dice);

        tracing::debug!(
            attacker = %roll.attacker,
            defender = %roll.defender,
            attack_total = roll.attack_total,
            defense_total = roll.defense_total,
            hit = roll.hit,
            "combat exchange"
        );

        let end = (roll.defender_hp == 0).then_some(CombatEnd::Victory {
            winner: roll.attacker,
            loser: roll.defender,
        });
        Ok(self.finish_step(CombatAction::Attack(roll), end))
    }

    /// `actor` tries to get away.
    pub fn evade(
        &mut self,
        actor: PlayerId,
        dice: &mut impl DiceRoller,
    ) -> Result<CombatStep, CombatError> {
        let a = self.check_turn(actor)?;
        let fighter = &mut self.fighters[a];
        if fighter.evasions_left == 0 {
            return Err(CombatError::NoEvasionLeft(actor));
        }
        fighter.evasions_left -= 1;
        let success = dice.chance(EVASION_CHANCE);
        let attempts_left = fighter.evasions_left;

        tracing::debug!(%actor, success, attempts_left, "evasion attempt");

        let end = success.then_some(CombatEnd::Evaded { by: actor });
        Ok(self.finish_step(
            CombatAction::Evasion {
                by: actor,
                success,
                attempts_left,
            },
            end,
        ))
    }

    /// Ends the combat in the opponent's favor without rolling, e.g. when
    /// `loser` disconnects. Works regardless of whose turn it is.
    pub fn forfeit(&mut self, loser: PlayerId) -> Result<CombatEnd, CombatError> {
        let winner = self
            .opponent_of(loser)
            .ok_or(CombatError::NotACombatant(loser))?;
        if self.outcome.is_some() {
            return Err(CombatError::Finished);
        }
        let end = CombatEnd::Victory { winner, loser };
        self.outcome = Some(end);
        tracing::debug!(%winner, %loser, "combat forfeited");
        Ok(end)
    }

    fn index_of(&self, id: PlayerId) -> Option<usize> {
        self.fighters.iter().position(|f| f.id == id)
    }

    fn check_turn(&self, actor: PlayerId) -> Result<usize, CombatError> {
        let idx = self
            .index_of(actor)
            .ok_or(CombatError::NotACombatant(actor))?;
        if self.outcome.is_some() {
            return Err(CombatError::Finished);
        }
        if idx != self.active {
            return Err(CombatError::NotYourTurn(actor));
        }
        Ok(idx)
    }

    fn finish_step(&mut self, action: CombatAction, end: Option<CombatEnd>) -> CombatStep {
        self.exchanges += 1;
        let end = end.or_else(|| {
            (self.exchanges >= self.config.max_exchanges).then_some(CombatEnd::Draw)
        });
        match end {
            Some(end) => self.outcome = Some(end),
            None => self.active = 1 - self.active,
        }
        CombatStep { action, end }
    }
}
