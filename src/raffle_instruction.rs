use arrayref::{array_mut_ref, array_ref, array_refs, mut_array_refs};
use solana_program::{
    instruction::{AccountMeta, Instruction},
    program_error::ProgramError,
    pubkey::Pubkey,
    system_program,
};
use std::convert::TryInto;

use crate::{
    raffle_state::{DEFAULT_NUM_WORDS, DEFAULT_REQUEST_CONFIRMATIONS},
    utils::RandomWord,
};

/// Construction-time raffle settings
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RaffleParams {
    /// Minimum payment per entry in lamports
    pub entrance_fee: u64,
    /// Minimum seconds between draws
    pub draw_interval: i64,
    pub key_hash: [u8; 32],
    pub subscription_id: u64,
    pub callback_compute_limit: u32,
    pub request_confirmations: u16,
    pub num_words: u32,
    pub max_players: u32,
}

impl RaffleParams {
    pub const LEN: usize = 8 + 8 + 32 + 8 + 4 + 2 + 4 + 4;

    /// Settings with the default confirmation count and a single random word
    pub fn new(
        entrance_fee: u64,
        draw_interval: i64,
        key_hash: [u8; 32],
        subscription_id: u64,
        callback_compute_limit: u32,
        max_players: u32,
    ) -> Self {
        Self {
            entrance_fee,
            draw_interval,
            key_hash,
            subscription_id,
            callback_compute_limit,
            request_confirmations: DEFAULT_REQUEST_CONFIRMATIONS,
            num_words: DEFAULT_NUM_WORDS,
            max_players,
        }
    }

    fn unpack(src: &[u8]) -> Result<Self, ProgramError> {
        if src.len() < Self::LEN {
            return Err(ProgramError::InvalidInstructionData);
        }
        let src = array_ref![src, 0, RaffleParams::LEN];
        let (
            entrance_fee,
            draw_interval,
            key_hash,
            subscription_id,
            callback_compute_limit,
            request_confirmations,
            num_words,
            max_players,
        ) = array_refs![src, 8, 8, 32, 8, 4, 2, 4, 4];

        Ok(Self {
            entrance_fee: u64::from_le_bytes(*entrance_fee),
            draw_interval: i64::from_le_bytes(*draw_interval),
            key_hash: *key_hash,
            subscription_id: u64::from_le_bytes(*subscription_id),
            callback_compute_limit: u32::from_le_bytes(*callback_compute_limit),
            request_confirmations: u16::from_le_bytes(*request_confirmations),
            num_words: u32::from_le_bytes(*num_words),
            max_players: u32::from_le_bytes(*max_players),
        })
    }

    fn pack_into(&self, buf: &mut Vec<u8>) {
        let mut dst = [0u8; RaffleParams::LEN];
        {
            let dst = array_mut_ref![dst, 0, RaffleParams::LEN];
            let (
                entrance_fee_dst,
                draw_interval_dst,
                key_hash_dst,
                subscription_id_dst,
                callback_compute_limit_dst,
                request_confirmations_dst,
                num_words_dst,
                max_players_dst,
            ) = mut_array_refs![dst, 8, 8, 32, 8, 4, 2, 4, 4];
            *entrance_fee_dst = self.entrance_fee.to_le_bytes();
            *draw_interval_dst = self.draw_interval.to_le_bytes();
            *key_hash_dst = self.key_hash;
            *subscription_id_dst = self.subscription_id.to_le_bytes();
            *callback_compute_limit_dst = self.callback_compute_limit.to_le_bytes();
            *request_confirmations_dst = self.request_confirmations.to_le_bytes();
            *num_words_dst = self.num_words.to_le_bytes();
            *max_players_dst = self.max_players.to_le_bytes();
        }
        buf.extend_from_slice(&dst);
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RaffleInstruction {
    /// Create and configure a raffle
    ///
    /// Accounts expected:
    /// 0. `[signer, writable]` The payer funding the raffle account
    /// 1. `[signer, writable]` The raffle account (new keypair)
    /// 2. `[]` The randomness coordinator program
    /// 3. `[]` The oracle authority allowed to fulfill draws
    /// 4. `[]` The system program
    InitializeRaffle(RaffleParams),

    /// Enter the current round
    ///
    /// Accounts expected:
    /// 0. `[signer, writable]` The entrant paying the fee
    /// 1. `[writable]` The raffle account
    /// 2. `[]` The system program
    EnterRaffle {
        /// Lamports paid, at least the entrance fee
        amount: u64,
    },

    /// Evaluate whether a draw is due; the result is set as return data
    ///
    /// Accounts expected:
    /// 0. `[]` The raffle account
    CheckUpkeep {
        /// Opaque bytes echoed back to the caller
        check_data: Vec<u8>,
    },

    /// Start a draw by requesting randomness (anyone may call)
    ///
    /// Accounts expected:
    /// 0. `[signer]` The caller
    /// 1. `[writable]` The raffle account
    /// 2. `[]` The randomness coordinator program
    /// Remaining accounts are forwarded to the coordinator
    PerformUpkeep { perform_data: Vec<u8> },

    /// Randomness callback: pick and pay the winner
    ///
    /// Accounts expected:
    /// 0. `[signer]` The oracle authority
    /// 1. `[writable]` The raffle account
    /// 2. `[writable]` The winner, as derived from the first random word
    FulfillRandomWords {
        request_id: u64,
        random_words: Vec<RandomWord>,
    },

    /// Enter with lamports already transferred to the raffle account.
    /// Empty instruction data decodes to this as well.
    ///
    /// Every unrecorded lamport counts as the caller's payment, so the
    /// transfer must precede this instruction in the same transaction.
    ///
    /// Accounts expected:
    /// 0. `[signer]` The entrant
    /// 1. `[writable]` The raffle account
    ReceivePayment,
}

impl RaffleInstruction {
    /// Unpacks a byte buffer into a RaffleInstruction
    pub fn unpack(input: &[u8]) -> Result<Self, ProgramError> {
        let (tag, rest) = match input.split_first() {
            Some(split) => split,
            None => return Ok(Self::ReceivePayment),
        };

        Ok(match tag {
            0 => Self::InitializeRaffle(RaffleParams::unpack(rest)?),
            1 => {
                let (amount, _) = Self::unpack_u64(rest)?;
                Self::EnterRaffle { amount }
            }
            2 => {
                let (check_data, _) = Self::unpack_bytes(rest)?;
                Self::CheckUpkeep { check_data }
            }
            3 => {
                let (perform_data, _) = Self::unpack_bytes(rest)?;
                Self::PerformUpkeep { perform_data }
            }
            4 => {
                let (request_id, rest) = Self::unpack_u64(rest)?;
                let (count, mut rest) = Self::unpack_u32(rest)?;
                let mut random_words = Vec::with_capacity(count.min(16) as usize);
                for _ in 0..count {
                    let (word, next) = Self::unpack_fixed_bytes::<32>(rest)?;
                    random_words.push(word);
                    rest = next;
                }
                Self::FulfillRandomWords {
                    request_id,
                    random_words,
                }
            }
            5 => Self::ReceivePayment,
            _ => return Err(ProgramError::InvalidInstructionData),
        })
    }

    /// Packs a RaffleInstruction into a byte buffer
    pub fn pack(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            Self::InitializeRaffle(params) => {
                buf.push(0);
                params.pack_into(&mut buf);
            }
            Self::EnterRaffle { amount } => {
                buf.push(1);
                buf.extend_from_slice(&amount.to_le_bytes());
            }
            Self::CheckUpkeep { check_data } => {
                buf.push(2);
                Self::pack_bytes(check_data, &mut buf);
            }
            Self::PerformUpkeep { perform_data } => {
                buf.push(3);
                Self::pack_bytes(perform_data, &mut buf);
            }
            Self::FulfillRandomWords {
                request_id,
                random_words,
            } => {
                buf.push(4);
                buf.extend_from_slice(&request_id.to_le_bytes());
                buf.extend_from_slice(&(random_words.len() as u32).to_le_bytes());
                for word in random_words {
                    buf.extend_from_slice(word);
                }
            }
            // direct payments carry no data
            Self::ReceivePayment => {}
        }
        buf
    }

    fn unpack_u64(input: &[u8]) -> Result<(u64, &[u8]), ProgramError> {
        let value = input
            .get(..8)
            .and_then(|slice| slice.try_into().ok())
            .map(u64::from_le_bytes)
            .ok_or(ProgramError::InvalidInstructionData)?;
        Ok((value, &input[8..]))
    }

    fn unpack_u32(input: &[u8]) -> Result<(u32, &[u8]), ProgramError> {
        let value = input
            .get(..4)
            .and_then(|slice| slice.try_into().ok())
            .map(u32::from_le_bytes)
            .ok_or(ProgramError::InvalidInstructionData)?;
        Ok((value, &input[4..]))
    }

    fn unpack_fixed_bytes<const N: usize>(input: &[u8]) -> Result<([u8; N], &[u8]), ProgramError> {
        let bytes = input
            .get(..N)
            .and_then(|slice| slice.try_into().ok())
            .ok_or(ProgramError::InvalidInstructionData)?;
        Ok((bytes, &input[N..]))
    }

    fn unpack_bytes(input: &[u8]) -> Result<(Vec<u8>, &[u8]), ProgramError> {
        let (len, rest) = Self::unpack_u32(input)?;
        let bytes = rest
            .get(..len as usize)
            .ok_or(ProgramError::InvalidInstructionData)?;
        Ok((bytes.to_vec(), &rest[len as usize..]))
    }

    fn pack_bytes(bytes: &[u8], buf: &mut Vec<u8>) {
        buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        buf.extend_from_slice(bytes);
    }
}

/// Create initialize_raffle instruction
pub fn initialize_raffle(
    program_id: &Pubkey,
    payer: &Pubkey,
    raffle_account: &Pubkey,
    coordinator_program: &Pubkey,
    oracle_authority: &Pubkey,
    params: RaffleParams,
) -> Instruction {
    let accounts = vec![
        AccountMeta::new(*payer, true),
        AccountMeta::new(*raffle_account, true),
        AccountMeta::new_readonly(*coordinator_program, false),
        AccountMeta::new_readonly(*oracle_authority, false),
        AccountMeta::new_readonly(system_program::id(), false),
    ];

    Instruction {
        program_id: *program_id,
        accounts,
        data: RaffleInstruction::InitializeRaffle(params).pack(),
    }
}

/// Create enter_raffle instruction
pub fn enter_raffle(
    program_id: &Pubkey,
    entrant: &Pubkey,
    raffle_account: &Pubkey,
    amount: u64,
) -> Instruction {
    let accounts = vec![
        AccountMeta::new(*entrant, true),
        AccountMeta::new(*raffle_account, false),
        AccountMeta::new_readonly(system_program::id(), false),
    ];

    Instruction {
        program_id: *program_id,
        accounts,
        data: RaffleInstruction::EnterRaffle { amount }.pack(),
    }
}

/// Create receive_payment instruction.
///
/// Place it right after the system transfer that pays the entry, in the same
/// transaction. Lamports sent to the raffle account in an earlier transaction
/// are unattributed: the next direct entrant is credited with all of them.
pub fn receive_payment(
    program_id: &Pubkey,
    entrant: &Pubkey,
    raffle_account: &Pubkey,
) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new_readonly(*entrant, true),
            AccountMeta::new(*raffle_account, false),
        ],
        data: RaffleInstruction::ReceivePayment.pack(),
    }
}

/// Create check_upkeep instruction
pub fn check_upkeep(program_id: &Pubkey, raffle_account: &Pubkey, check_data: Vec<u8>) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: vec![AccountMeta::new_readonly(*raffle_account, false)],
        data: RaffleInstruction::CheckUpkeep { check_data }.pack(),
    }
}

/// Create perform_upkeep instruction
pub fn perform_upkeep(
    program_id: &Pubkey,
    caller: &Pubkey,
    raffle_account: &Pubkey,
    coordinator_program: &Pubkey,
    coordinator_accounts: &[AccountMeta],
    perform_data: Vec<u8>,
) -> Instruction {
    let mut accounts = vec![
        AccountMeta::new_readonly(*caller, true),
        AccountMeta::new(*raffle_account, false),
        AccountMeta::new_readonly(*coordinator_program, false),
    ];
    accounts.extend_from_slice(coordinator_accounts);

    Instruction {
        program_id: *program_id,
        accounts,
        data: RaffleInstruction::PerformUpkeep { perform_data }.pack(),
    }
}

/// Create fulfill_random_words instruction
pub fn fulfill_random_words(
    program_id: &Pubkey,
    oracle_authority: &Pubkey,
    raffle_account: &Pubkey,
    winner: &Pubkey,
    request_id: u64,
    random_words: Vec<RandomWord>,
) -> Instruction {
    let accounts = vec![
        AccountMeta::new_readonly(*oracle_authority, true),
        AccountMeta::new(*raffle_account, false),
        AccountMeta::new(*winner, false),
    ];

    Instruction {
        program_id: *program_id,
        accounts,
        data: RaffleInstruction::FulfillRandomWords {
            request_id,
            random_words,
        }
        .pack(),
    }
}
