// SolRaffle
// A draw-on-demand raffle: entries accumulate a prize pool, an automation
// trigger starts a draw once it is due, and an external randomness
// coordinator calls back with the words that pick the winner.

pub mod raffle_engine;
pub mod raffle_error;
pub mod raffle_events;
pub mod raffle_instruction;
pub mod raffle_processor;
pub mod raffle_state;
pub mod utils;

// Randomness coordinator integration
pub mod vrf;

#[cfg(not(feature = "no-entrypoint"))]
pub mod raffle_entrypoint;

use solana_program::{account_info::AccountInfo, entrypoint::ProgramResult, pubkey::Pubkey};

pub fn process_instruction(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    instruction_data: &[u8],
) -> ProgramResult {
    raffle_processor::Processor::process(program_id, accounts, instruction_data)
}
