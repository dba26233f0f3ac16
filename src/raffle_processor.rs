use crate::raffle_engine::{self, PrizeTransfer};
use crate::raffle_error::RaffleError;
use crate::raffle_instruction::{RaffleInstruction, RaffleParams};
use crate::raffle_state::{
    load_raffle, raffle_account_len, store_state, RaffleConfig, RaffleState,
};
use crate::utils::{lamports_to_sol, RandomWord};
use crate::vrf::CoordinatorClient;

use borsh::BorshSerialize;
use solana_program::{
    account_info::{next_account_info, AccountInfo},
    entrypoint::{ProgramResult, MAX_PERMITTED_DATA_INCREASE},
    msg,
    program::{invoke, set_return_data},
    program_error::ProgramError,
    program_pack::Pack,
    pubkey::Pubkey,
    system_instruction,
    sysvar::{clock::Clock, rent::Rent, Sysvar},
};

pub struct Processor;

impl Processor {
    pub fn process(
        program_id: &Pubkey,
        accounts: &[AccountInfo],
        instruction_data: &[u8],
    ) -> ProgramResult {
        let instruction = RaffleInstruction::unpack(instruction_data)?;

        match instruction {
            RaffleInstruction::InitializeRaffle(params) => {
                msg!("Instruction: Initialize Raffle");
                Self::process_initialize_raffle(accounts, params, program_id)
            }
            RaffleInstruction::EnterRaffle { amount } => {
                msg!("Instruction: Enter Raffle");
                Self::process_enter_raffle(accounts, amount, program_id)
            }
            RaffleInstruction::CheckUpkeep { check_data } => {
                msg!("Instruction: Check Upkeep");
                Self::process_check_upkeep(accounts, &check_data, program_id)
            }
            RaffleInstruction::PerformUpkeep { perform_data } => {
                msg!("Instruction: Perform Upkeep");
                Self::process_perform_upkeep(accounts, &perform_data, program_id)
            }
            RaffleInstruction::FulfillRandomWords {
                request_id,
                random_words,
            } => {
                msg!("Instruction: Fulfill Random Words");
                Self::process_fulfill_random_words(accounts, request_id, &random_words, program_id)
            }
            RaffleInstruction::ReceivePayment => {
                msg!("Instruction: Receive Payment");
                Self::process_receive_payment(accounts, program_id)
            }
        }
    }

    fn load_owned_raffle(
        raffle_info: &AccountInfo,
        program_id: &Pubkey,
    ) -> Result<(RaffleConfig, RaffleState), ProgramError> {
        if raffle_info.owner != program_id {
            msg!("Raffle account must be owned by this program");
            return Err(ProgramError::IncorrectProgramId);
        }
        let data = raffle_info.data.borrow();
        load_raffle(&data)
    }

    fn process_initialize_raffle(
        accounts: &[AccountInfo],
        params: RaffleParams,
        program_id: &Pubkey,
    ) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let payer_info = next_account_info(account_info_iter)?;
        let raffle_info = next_account_info(account_info_iter)?;
        let coordinator_info = next_account_info(account_info_iter)?;
        let oracle_authority_info = next_account_info(account_info_iter)?;
        let system_program_info = next_account_info(account_info_iter)?;

        if !payer_info.is_signer || !raffle_info.is_signer {
            msg!("Payer and raffle account must sign the transaction");
            return Err(ProgramError::MissingRequiredSignature);
        }

        if raffle_info.owner == program_id {
            msg!("Raffle account is already initialized");
            return Err(ProgramError::AccountAlreadyInitialized);
        }

        // Validate inputs
        if params.num_words == 0 {
            msg!("At least one random word must be requested");
            return Err(ProgramError::InvalidArgument);
        }
        if params.max_players == 0 {
            msg!("Raffle must have room for at least one player");
            return Err(ProgramError::InvalidArgument);
        }
        if params.draw_interval < 0 {
            msg!("Draw interval cannot be negative");
            return Err(ProgramError::InvalidArgument);
        }

        let space = raffle_account_len(params.max_players);
        if space > MAX_PERMITTED_DATA_INCREASE {
            msg!("Raffle account of {} bytes cannot be created in one instruction", space);
            return Err(ProgramError::InvalidArgument);
        }
        let rent = Rent::get()?;
        invoke(
            &system_instruction::create_account(
                payer_info.key,
                raffle_info.key,
                rent.minimum_balance(space),
                space as u64,
                program_id,
            ),
            &[
                payer_info.clone(),
                raffle_info.clone(),
                system_program_info.clone(),
            ],
        )?;

        let config = RaffleConfig {
            is_initialized: true,
            entrance_fee: params.entrance_fee,
            draw_interval: params.draw_interval,
            coordinator: *coordinator_info.key,
            oracle_authority: *oracle_authority_info.key,
            key_hash: params.key_hash,
            subscription_id: params.subscription_id,
            callback_compute_limit: params.callback_compute_limit,
            request_confirmations: params.request_confirmations,
            num_words: params.num_words,
            max_players: params.max_players,
        };
        let state = RaffleState::new(Clock::get()?.unix_timestamp);

        let mut data = raffle_info.data.borrow_mut();
        RaffleConfig::pack(config, &mut data[..RaffleConfig::LEN])?;
        store_state(&state, &mut data)?;

        msg!(
            "Raffle initialized: EntranceFee={} SOL, Interval={}s, MaxPlayers={}, Coordinator={}",
            lamports_to_sol(config.entrance_fee),
            config.draw_interval,
            config.max_players,
            config.coordinator
        );
        Ok(())
    }

    fn process_enter_raffle(
        accounts: &[AccountInfo],
        amount: u64,
        program_id: &Pubkey,
    ) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let entrant_info = next_account_info(account_info_iter)?;
        let raffle_info = next_account_info(account_info_iter)?;
        let system_program_info = next_account_info(account_info_iter)?;

        if !entrant_info.is_signer {
            msg!("Entrant must sign the transaction");
            return Err(ProgramError::MissingRequiredSignature);
        }

        let (config, mut state) = Self::load_owned_raffle(raffle_info, program_id)?;
        let event = raffle_engine::enter(&config, &mut state, *entrant_info.key, amount)?;

        invoke(
            &system_instruction::transfer(entrant_info.key, raffle_info.key, amount),
            &[
                entrant_info.clone(),
                raffle_info.clone(),
                system_program_info.clone(),
            ],
        )?;

        store_state(&state, &mut raffle_info.data.borrow_mut())?;
        event.emit()?;

        msg!(
            "Entry recorded for {}: {} lamports, {} players, pool {} lamports",
            entrant_info.key,
            amount,
            state.number_of_players(),
            state.accumulated_balance
        );
        Ok(())
    }

    /// Treats lamports sitting in the raffle account above its rent reserve
    /// and the recorded pool as the entrant's payment.
    fn process_receive_payment(accounts: &[AccountInfo], program_id: &Pubkey) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let entrant_info = next_account_info(account_info_iter)?;
        let raffle_info = next_account_info(account_info_iter)?;

        if !entrant_info.is_signer {
            msg!("Entrant must sign the transaction");
            return Err(ProgramError::MissingRequiredSignature);
        }

        let (config, mut state) = Self::load_owned_raffle(raffle_info, program_id)?;

        let reserve = Rent::get()?.minimum_balance(raffle_info.data_len());
        let received = raffle_info
            .lamports()
            .saturating_sub(reserve)
            .saturating_sub(state.accumulated_balance);
        msg!("Unrecorded lamports in raffle account: {}", received);

        let event = raffle_engine::enter(&config, &mut state, *entrant_info.key, received)?;

        store_state(&state, &mut raffle_info.data.borrow_mut())?;
        event.emit()?;

        msg!(
            "Direct payment recorded for {}: {} players",
            entrant_info.key,
            state.number_of_players()
        );
        Ok(())
    }

    fn process_check_upkeep(
        accounts: &[AccountInfo],
        check_data: &[u8],
        program_id: &Pubkey,
    ) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let raffle_info = next_account_info(account_info_iter)?;

        let (config, state) = Self::load_owned_raffle(raffle_info, program_id)?;
        let now = Clock::get()?.unix_timestamp;
        let check = raffle_engine::check_eligibility(&config, &state, now, check_data);

        msg!(
            "Upkeep needed: {} (phase {:?}, {} players, pool {} lamports)",
            check.upkeep_needed,
            state.phase,
            state.number_of_players(),
            state.accumulated_balance
        );
        set_return_data(&check.try_to_vec()?);
        Ok(())
    }

    fn process_perform_upkeep(
        accounts: &[AccountInfo],
        perform_data: &[u8],
        program_id: &Pubkey,
    ) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let caller_info = next_account_info(account_info_iter)?;
        let raffle_info = next_account_info(account_info_iter)?;
        let coordinator_info = next_account_info(account_info_iter)?;
        let remaining_accounts = account_info_iter.as_slice();

        // Anyone can trigger a draw; the predicate decides
        if !caller_info.is_signer {
            msg!("Caller must sign the transaction");
            return Err(ProgramError::MissingRequiredSignature);
        }

        let (config, mut state) = Self::load_owned_raffle(raffle_info, program_id)?;

        if *coordinator_info.key != config.coordinator {
            msg!("Coordinator program does not match the one configured for this raffle");
            return Err(ProgramError::IncorrectProgramId);
        }

        msg!("Perform data: {} bytes", perform_data.len());
        let now = Clock::get()?.unix_timestamp;
        let mut oracle = CoordinatorClient {
            coordinator_program: coordinator_info,
            consumer: raffle_info,
            remaining_accounts,
        };
        let event = raffle_engine::initiate_draw(&config, &mut state, now, &mut oracle)?;

        store_state(&state, &mut raffle_info.data.borrow_mut())?;
        event.emit()?;

        msg!("Randomness requested for raffle {}", raffle_info.key);
        Ok(())
    }

    fn process_fulfill_random_words(
        accounts: &[AccountInfo],
        request_id: u64,
        random_words: &[RandomWord],
        program_id: &Pubkey,
    ) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let oracle_authority_info = next_account_info(account_info_iter)?;
        let raffle_info = next_account_info(account_info_iter)?;
        let winner_info = next_account_info(account_info_iter)?;

        if !oracle_authority_info.is_signer {
            msg!("Oracle authority must sign the callback");
            return Err(RaffleError::UnauthorizedCallback.into());
        }

        let (config, mut state) = Self::load_owned_raffle(raffle_info, program_id)?;
        let now = Clock::get()?.unix_timestamp;
        let mut payout = LamportPayout {
            raffle_info,
            winner_info,
            rent: Rent::get()?,
        };

        let event = raffle_engine::settle_draw(
            &config,
            &mut state,
            oracle_authority_info.key,
            request_id,
            random_words,
            now,
            &mut payout,
        )?;

        store_state(&state, &mut raffle_info.data.borrow_mut())?;
        event.emit()?;

        msg!("Raffle settled for request {}", request_id);
        Ok(())
    }
}

/// Pays the prize straight out of the program-owned raffle account.
/// Both accounts must stay rent exempt afterwards.
struct LamportPayout<'a, 'info> {
    raffle_info: &'a AccountInfo<'info>,
    winner_info: &'a AccountInfo<'info>,
    rent: Rent,
}

impl<'a, 'info> PrizeTransfer for LamportPayout<'a, 'info> {
    fn transfer(&mut self, winner: &Pubkey, amount: u64) -> Result<(), ProgramError> {
        if self.winner_info.key != winner {
            msg!(
                "Winner account {} does not match drawn winner {}",
                self.winner_info.key,
                winner
            );
            return Err(ProgramError::InvalidArgument);
        }
        if !self.winner_info.is_writable {
            msg!("Winner account must be writable");
            return Err(ProgramError::InvalidArgument);
        }

        let raffle_reserve = self.rent.minimum_balance(self.raffle_info.data_len());
        let remaining = self
            .raffle_info
            .lamports()
            .checked_sub(amount)
            .filter(|left| *left >= raffle_reserve)
            .ok_or(ProgramError::InsufficientFunds)?;
        let credited = self
            .winner_info
            .lamports()
            .checked_add(amount)
            .ok_or(ProgramError::InvalidArgument)?;

        // the runtime rejects a transaction that leaves an account rent-paying
        let winner_reserve = self.rent.minimum_balance(self.winner_info.data_len());
        if credited < winner_reserve {
            msg!(
                "Winner {} would hold {} lamports, below its rent-exempt minimum of {}",
                self.winner_info.key,
                credited,
                winner_reserve
            );
            return Err(ProgramError::InsufficientFunds);
        }

        **self.raffle_info.lamports.borrow_mut() = remaining;
        **self.winner_info.lamports.borrow_mut() = credited;

        msg!(
            "Paid {} SOL to {}",
            lamports_to_sol(amount),
            self.winner_info.key
        );
        Ok(())
    }
}
