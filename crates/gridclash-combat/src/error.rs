//! Error types for combat actions.

use gridclash_protocol::{ErrorCode, PlayerId};

/// Why a combat action was refused. The combat is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CombatError {
    #[error("player {0} is not part of this combat")]
    NotACombatant(PlayerId),

    #[error("it is not {0}'s turn to act")]
    NotYourTurn(PlayerId),

    #[error("player {0} has no evasion attempts left")]
    NoEvasionLeft(PlayerId),

    #[error("combat is already over")]
    Finished,
}

impl CombatError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotACombatant(_) => ErrorCode::NotInCombat,
            Self::NotYourTurn(_) => ErrorCode::NotYourTurn,
            Self::NoEvasionLeft(_) => ErrorCode::NoEvasionLeft,
            Self::Finished => ErrorCode::InvalidState,
        }
    }
}
