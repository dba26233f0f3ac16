// Randomness coordinator integration
use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{
    account_info::AccountInfo,
    instruction::{AccountMeta, Instruction},
    msg,
    program::{get_return_data, invoke},
    program_error::ProgramError,
};
use std::convert::TryInto;

use crate::raffle_state::RaffleConfig;

/// Coordinator instruction tag for a randomness request
pub const REQUEST_RANDOM_WORDS_TAG: u8 = 0;

/// Parameters of one randomness request
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct DrawRequest {
    /// Priority lane
    pub key_hash: [u8; 32],
    pub subscription_id: u64,
    pub request_confirmations: u16,
    /// Compute budget for the fulfillment callback
    pub callback_compute_limit: u32,
    pub num_words: u32,
}

impl DrawRequest {
    pub fn from_config(config: &RaffleConfig) -> Self {
        Self {
            key_hash: config.key_hash,
            subscription_id: config.subscription_id,
            request_confirmations: config.request_confirmations,
            callback_compute_limit: config.callback_compute_limit,
            num_words: config.num_words,
        }
    }

    /// Coordinator wire format: tag byte followed by the borsh-encoded request
    pub fn pack(&self) -> Result<Vec<u8>, ProgramError> {
        let mut buf = vec![REQUEST_RANDOM_WORDS_TAG];
        self.serialize(&mut buf)?;
        Ok(buf)
    }
}

/// Source of randomness for draws. The answer arrives later, in a separate
/// `FulfillRandomWords` instruction carrying the returned request id.
pub trait RandomnessOracle {
    fn request_draw(&mut self, request: &DrawRequest) -> Result<u64, ProgramError>;
}

/// Requests randomness from the coordinator program through CPI.
///
/// The raffle account goes first as the consumer; `remaining_accounts` are the
/// coordinator's own accounts and are forwarded as given. The coordinator
/// answers with the request id as 8 little-endian bytes of return data.
pub struct CoordinatorClient<'a, 'info> {
    pub coordinator_program: &'a AccountInfo<'info>,
    pub consumer: &'a AccountInfo<'info>,
    pub remaining_accounts: &'a [AccountInfo<'info>],
}

impl<'a, 'info> RandomnessOracle for CoordinatorClient<'a, 'info> {
    fn request_draw(&mut self, request: &DrawRequest) -> Result<u64, ProgramError> {
        let mut accounts = vec![AccountMeta::new_readonly(*self.consumer.key, false)];
        accounts.extend(self.remaining_accounts.iter().map(|acc| AccountMeta {
            pubkey: *acc.key,
            is_signer: acc.is_signer,
            is_writable: acc.is_writable,
        }));

        let mut account_infos = vec![self.consumer.clone()];
        account_infos.extend_from_slice(self.remaining_accounts);
        account_infos.push(self.coordinator_program.clone());

        invoke(
            &Instruction {
                program_id: *self.coordinator_program.key,
                accounts,
                data: request.pack()?,
            },
            &account_infos,
        )?;

        let (program_id, data) = get_return_data().ok_or_else(|| {
            msg!("Coordinator returned no request id");
            ProgramError::InvalidAccountData
        })?;
        if program_id != *self.coordinator_program.key {
            msg!("Return data was not set by the coordinator");
            return Err(ProgramError::IncorrectProgramId);
        }

        data.get(..8)
            .and_then(|slice| slice.try_into().ok())
            .map(u64::from_le_bytes)
            .ok_or(ProgramError::InvalidAccountData)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_wire_format() {
        let request = DrawRequest {
            key_hash: [1u8; 32],
            subscription_id: 2,
            request_confirmations: 3,
            callback_compute_limit: 500_000,
            num_words: 1,
        };
        let data = request.pack().unwrap();
        assert_eq!(data.len(), 1 + 32 + 8 + 2 + 4 + 4);
        assert_eq!(data[0], REQUEST_RANDOM_WORDS_TAG);
        assert_eq!(&data[33..41], &2u64.to_le_bytes());
        assert_eq!(DrawRequest::try_from_slice(&data[1..]).unwrap(), request);
    }
}
