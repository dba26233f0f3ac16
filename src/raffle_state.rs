use arrayref::{array_mut_ref, array_ref, array_refs, mut_array_refs};
use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{
    clock::UnixTimestamp,
    entrypoint::ProgramResult,
    program_error::ProgramError,
    program_pack::{IsInitialized, Pack, Sealed},
    pubkey::Pubkey,
};

/// Confirmations requested from the randomness coordinator unless configured otherwise
pub const DEFAULT_REQUEST_CONFIRMATIONS: u16 = 3;
/// Random words requested per draw unless configured otherwise
pub const DEFAULT_NUM_WORDS: u32 = 1;

/// Phase of the current round
#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RafflePhase {
    /// Accepting entries
    Open,
    /// Waiting for the randomness callback
    Drawing,
}

impl Default for RafflePhase {
    fn default() -> Self {
        RafflePhase::Open
    }
}

/// Construction-time configuration, stored at the head of the raffle account.
/// Never rewritten after `InitializeRaffle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RaffleConfig {
    /// Is the account initialized
    pub is_initialized: bool,
    /// Minimum payment per entry in lamports
    pub entrance_fee: u64,
    /// Minimum seconds between two draws
    pub draw_interval: i64,
    /// Program id of the randomness coordinator
    pub coordinator: Pubkey,
    /// Only key allowed to deliver random words
    pub oracle_authority: Pubkey,
    /// Coordinator priority lane
    pub key_hash: [u8; 32],
    /// Coordinator subscription paying for requests
    pub subscription_id: u64,
    /// Compute budget granted to the callback
    pub callback_compute_limit: u32,
    pub request_confirmations: u16,
    pub num_words: u32,
    /// Entries the account has room for
    pub max_players: u32,
}

impl Sealed for RaffleConfig {}

impl IsInitialized for RaffleConfig {
    fn is_initialized(&self) -> bool {
        self.is_initialized
    }
}

impl Pack for RaffleConfig {
    const LEN: usize = 1 + 8 + 8 + 32 + 32 + 32 + 8 + 4 + 2 + 4 + 4;

    fn unpack_from_slice(src: &[u8]) -> Result<Self, ProgramError> {
        let src = array_ref![src, 0, RaffleConfig::LEN];
        let (
            is_initialized,
            entrance_fee,
            draw_interval,
            coordinator,
            oracle_authority,
            key_hash,
            subscription_id,
            callback_compute_limit,
            request_confirmations,
            num_words,
            max_players,
        ) = array_refs![src, 1, 8, 8, 32, 32, 32, 8, 4, 2, 4, 4];

        let is_initialized = match is_initialized[0] {
            0 => false,
            1 => true,
            _ => return Err(ProgramError::InvalidAccountData),
        };

        Ok(RaffleConfig {
            is_initialized,
            entrance_fee: u64::from_le_bytes(*entrance_fee),
            draw_interval: i64::from_le_bytes(*draw_interval),
            coordinator: Pubkey::new_from_array(*coordinator),
            oracle_authority: Pubkey::new_from_array(*oracle_authority),
            key_hash: *key_hash,
            subscription_id: u64::from_le_bytes(*subscription_id),
            callback_compute_limit: u32::from_le_bytes(*callback_compute_limit),
            request_confirmations: u16::from_le_bytes(*request_confirmations),
            num_words: u32::from_le_bytes(*num_words),
            max_players: u32::from_le_bytes(*max_players),
        })
    }

    fn pack_into_slice(&self, dst: &mut [u8]) {
        let dst = array_mut_ref![dst, 0, RaffleConfig::LEN];
        let (
            is_initialized_dst,
            entrance_fee_dst,
            draw_interval_dst,
            coordinator_dst,
            oracle_authority_dst,
            key_hash_dst,
            subscription_id_dst,
            callback_compute_limit_dst,
            request_confirmations_dst,
            num_words_dst,
            max_players_dst,
        ) = mut_array_refs![dst, 1, 8, 8, 32, 32, 32, 8, 4, 2, 4, 4];

        is_initialized_dst[0] = self.is_initialized as u8;
        *entrance_fee_dst = self.entrance_fee.to_le_bytes();
        *draw_interval_dst = self.draw_interval.to_le_bytes();
        coordinator_dst.copy_from_slice(self.coordinator.as_ref());
        oracle_authority_dst.copy_from_slice(self.oracle_authority.as_ref());
        key_hash_dst.copy_from_slice(&self.key_hash);
        *subscription_id_dst = self.subscription_id.to_le_bytes();
        *callback_compute_limit_dst = self.callback_compute_limit.to_le_bytes();
        *request_confirmations_dst = self.request_confirmations.to_le_bytes();
        *num_words_dst = self.num_words.to_le_bytes();
        *max_players_dst = self.max_players.to_le_bytes();
    }
}

/// Mutable state of the raffle. Lives right after the config in the raffle account.
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct RaffleState {
    /// Entrants of the current round, in entry order. One slot per entry.
    pub players: Vec<Pubkey>,
    pub phase: RafflePhase,
    /// Time of the last settled draw, or of initialization
    pub last_draw_timestamp: UnixTimestamp,
    pub recent_winner: Option<Pubkey>,
    /// In-flight coordinator request; `Some` exactly while drawing
    pub pending_request: Option<u64>,
    /// Lamports paid in since the last payout
    pub accumulated_balance: u64,
}

impl RaffleState {
    pub fn new(now: UnixTimestamp) -> Self {
        Self {
            last_draw_timestamp: now,
            ..Self::default()
        }
    }

    /// Borsh size of a state holding `max_players` entries
    pub fn max_len(max_players: u32) -> usize {
        4 + 32 * max_players as usize + 1 + 8 + (1 + 32) + (1 + 8) + 8
    }

    pub fn player(&self, index: usize) -> Option<&Pubkey> {
        self.players.get(index)
    }

    pub fn number_of_players(&self) -> u64 {
        self.players.len() as u64
    }
}

/// Space to allocate for a raffle account
pub fn raffle_account_len(max_players: u32) -> usize {
    RaffleConfig::LEN + RaffleState::max_len(max_players)
}

/// Reads config and state out of raffle account data
pub fn load_raffle(data: &[u8]) -> Result<(RaffleConfig, RaffleState), ProgramError> {
    if data.len() < RaffleConfig::LEN {
        return Err(ProgramError::AccountDataTooSmall);
    }
    let config = RaffleConfig::unpack(&data[..RaffleConfig::LEN])?;
    // trailing capacity is left zeroed, so read without requiring an exact fit
    let state = RaffleState::deserialize(&mut &data[RaffleConfig::LEN..])?;
    Ok((config, state))
}

/// Writes state back behind the config
pub fn store_state(state: &RaffleState, data: &mut [u8]) -> ProgramResult {
    if data.len() < RaffleConfig::LEN {
        return Err(ProgramError::AccountDataTooSmall);
    }
    let mut dst = &mut data[RaffleConfig::LEN..];
    state.serialize(&mut dst)?;
    Ok(())
}
