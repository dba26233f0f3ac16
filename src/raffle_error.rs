use solana_program::{msg, program_error::ProgramError};
use thiserror::Error;

use crate::raffle_state::RafflePhase;

/// Errors that may be returned by the Raffle program
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum RaffleError {
    /// Payment below the entrance fee
    #[error("Payment is below the entrance fee")]
    InsufficientPayment,

    /// Entries are only accepted while the raffle is open
    #[error("Raffle is not open")]
    RaffleNotOpen,

    /// The draw predicate is false
    #[error("Upkeep not needed: phase={phase:?}, players={player_count}, balance={balance}")]
    UpkeepNotNeeded {
        phase: RafflePhase,
        player_count: u64,
        balance: u64,
    },

    /// Settlement attempted by someone other than the configured oracle
    #[error("Callback is not from the configured randomness oracle")]
    UnauthorizedCallback,

    /// Settlement for a request id that is not the pending one
    #[error("Request id does not match the pending draw")]
    UnknownRequest,

    /// Prize transfer to the winner failed
    #[error("Prize payout to the winner failed")]
    PayoutFailed,

    /// Raffle account has no room for another entry
    #[error("Raffle has reached its player capacity")]
    RaffleFull,

    /// Prize pool arithmetic overflowed
    #[error("Prize pool overflow")]
    AmountOverflow,

    /// The randomness coordinator did not accept the request
    #[error("Randomness request failed")]
    RandomnessRequestFailed,

    /// Callback delivered no random words
    #[error("Callback carried no random words")]
    MissingRandomness,

    /// No entrant to pick a winner from
    #[error("No players in the current round")]
    NoPlayers,
}

impl RaffleError {
    /// Stable custom error code reported to clients
    pub fn code(&self) -> u32 {
        match self {
            RaffleError::InsufficientPayment => 0,
            RaffleError::RaffleNotOpen => 1,
            RaffleError::UpkeepNotNeeded { .. } => 2,
            RaffleError::UnauthorizedCallback => 3,
            RaffleError::UnknownRequest => 4,
            RaffleError::PayoutFailed => 5,
            RaffleError::RaffleFull => 6,
            RaffleError::AmountOverflow => 7,
            RaffleError::RandomnessRequestFailed => 8,
            RaffleError::MissingRandomness => 9,
            RaffleError::NoPlayers => 10,
        }
    }
}

impl From<RaffleError> for ProgramError {
    fn from(e: RaffleError) -> Self {
        // the custom code drops the variant's fields, so log them first
        msg!("Raffle error: {}", e);
        ProgramError::Custom(e.code())
    }
}
