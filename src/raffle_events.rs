use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{entrypoint::ProgramResult, log::sol_log_data, pubkey::Pubkey};

/// Notifications for indexers, published as `Program data:` log lines
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub enum RaffleEvent {
    /// An entry was appended to the current round
    EntryRecorded { entrant: Pubkey, total_players: u64 },
    /// A randomness request is in flight
    DrawRequested { request_id: u64 },
    /// The round settled and the prize was paid
    WinnerPicked { winner: Pubkey, prize: u64 },
}

impl RaffleEvent {
    pub fn emit(&self) -> ProgramResult {
        let data = self.try_to_vec()?;
        sol_log_data(&[&data]);
        Ok(())
    }
}
