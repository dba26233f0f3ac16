//! Raffle state machine.
//!
//! Every operation takes the raffle's config and state explicitly and either
//! applies its whole effect or returns an error with the state untouched.
//! The host (see `raffle_processor`) loads the state, calls in here and writes
//! the state back only when the call succeeded.
//!
//! Operational risk: there is no way to cancel a pending draw. If the
//! coordinator never calls back, the raffle stays in `Drawing` for good.

use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{
    clock::UnixTimestamp, msg, program_error::ProgramError, pubkey::Pubkey,
};

use crate::{
    raffle_error::RaffleError,
    raffle_events::RaffleEvent,
    raffle_state::{RaffleConfig, RafflePhase, RaffleState},
    utils::{self, RandomWord},
    vrf::{DrawRequest, RandomnessOracle},
};

/// Moves the prize out of the pool
pub trait PrizeTransfer {
    fn transfer(&mut self, winner: &Pubkey, amount: u64) -> Result<(), ProgramError>;
}

/// Result of an eligibility check
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct UpkeepCheck {
    pub upkeep_needed: bool,
    /// Caller-supplied bytes, echoed back untouched
    pub perform_data: Vec<u8>,
}

fn draw_is_due(config: &RaffleConfig, state: &RaffleState, now: UnixTimestamp) -> bool {
    let is_open = state.phase == RafflePhase::Open;
    let time_passed = now.saturating_sub(state.last_draw_timestamp) >= config.draw_interval;
    let has_players = !state.players.is_empty();
    let has_balance = state.accumulated_balance > 0;
    is_open && time_passed && has_players && has_balance
}

/// Append `entrant` to the current round
pub fn enter(
    config: &RaffleConfig,
    state: &mut RaffleState,
    entrant: Pubkey,
    amount: u64,
) -> Result<RaffleEvent, RaffleError> {
    if amount < config.entrance_fee {
        return Err(RaffleError::InsufficientPayment);
    }
    if state.phase != RafflePhase::Open {
        return Err(RaffleError::RaffleNotOpen);
    }
    if state.players.len() >= config.max_players as usize {
        return Err(RaffleError::RaffleFull);
    }
    let balance = state
        .accumulated_balance
        .checked_add(amount)
        .ok_or(RaffleError::AmountOverflow)?;

    state.players.push(entrant);
    state.accumulated_balance = balance;

    Ok(RaffleEvent::EntryRecorded {
        entrant,
        total_players: state.number_of_players(),
    })
}

/// Evaluate the draw predicate. Never fails and never mutates.
pub fn check_eligibility(
    config: &RaffleConfig,
    state: &RaffleState,
    now: UnixTimestamp,
    check_data: &[u8],
) -> UpkeepCheck {
    UpkeepCheck {
        upkeep_needed: draw_is_due(config, state, now),
        perform_data: check_data.to_vec(),
    }
}

/// Close the round and ask the coordinator for randomness.
///
/// The predicate is evaluated again here; an earlier positive check says
/// nothing about the state at this point.
pub fn initiate_draw<O: RandomnessOracle>(
    config: &RaffleConfig,
    state: &mut RaffleState,
    now: UnixTimestamp,
    oracle: &mut O,
) -> Result<RaffleEvent, RaffleError> {
    if !draw_is_due(config, state, now) {
        return Err(RaffleError::UpkeepNotNeeded {
            phase: state.phase,
            player_count: state.number_of_players(),
            balance: state.accumulated_balance,
        });
    }

    let request = DrawRequest::from_config(config);
    let request_id = oracle.request_draw(&request).map_err(|err| {
        msg!("Randomness coordinator rejected the request: {}", err);
        RaffleError::RandomnessRequestFailed
    })?;

    state.phase = RafflePhase::Drawing;
    state.pending_request = Some(request_id);

    Ok(RaffleEvent::DrawRequested { request_id })
}

/// Consume the coordinator's answer: pick the winner and pay out the pool.
///
/// Either everything happens (winner recorded, round reset, prize moved) or
/// nothing does.
pub fn settle_draw<T: PrizeTransfer>(
    config: &RaffleConfig,
    state: &mut RaffleState,
    caller: &Pubkey,
    request_id: u64,
    random_words: &[RandomWord],
    now: UnixTimestamp,
    payout: &mut T,
) -> Result<RaffleEvent, RaffleError> {
    if *caller != config.oracle_authority {
        return Err(RaffleError::UnauthorizedCallback);
    }
    if state.pending_request != Some(request_id) {
        return Err(RaffleError::UnknownRequest);
    }
    let word = random_words.first().ok_or(RaffleError::MissingRandomness)?;
    let index = utils::winner_index(word, state.players.len()).ok_or(RaffleError::NoPlayers)?;
    let winner = state.players[index];
    let prize = state.accumulated_balance;
    msg!(
        "Winner index {} of {} players: {}",
        index,
        state.players.len(),
        winner
    );

    let mut next = state.clone();
    next.recent_winner = Some(winner);
    next.players.clear();
    next.phase = RafflePhase::Open;
    next.last_draw_timestamp = now;
    next.pending_request = None;

    payout.transfer(&winner, prize).map_err(|err| {
        msg!("Payout of {} lamports to {} failed: {}", prize, winner, err);
        RaffleError::PayoutFailed
    })?;
    next.accumulated_balance = 0;

    *state = next;
    Ok(RaffleEvent::WinnerPicked { winner, prize })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raffle_state::{DEFAULT_NUM_WORDS, DEFAULT_REQUEST_CONFIRMATIONS};
    use crate::utils::word_from_u64;

    const FEE: u64 = 10;
    const INTERVAL: i64 = 30;
    const START: UnixTimestamp = 1_000;

    #[derive(Default)]
    struct MockOracle {
        last_id: u64,
        requests: Vec<DrawRequest>,
        offline: bool,
    }

    impl RandomnessOracle for MockOracle {
        fn request_draw(&mut self, request: &DrawRequest) -> Result<u64, ProgramError> {
            if self.offline {
                return Err(ProgramError::InvalidArgument);
            }
            self.last_id += 1;
            self.requests.push(request.clone());
            Ok(self.last_id)
        }
    }

    #[derive(Default)]
    struct MockPayout {
        paid: Vec<(Pubkey, u64)>,
        reject: bool,
    }

    impl PrizeTransfer for MockPayout {
        fn transfer(&mut self, winner: &Pubkey, amount: u64) -> Result<(), ProgramError> {
            if self.reject {
                return Err(ProgramError::InvalidAccountData);
            }
            self.paid.push((*winner, amount));
            Ok(())
        }
    }

    fn config() -> RaffleConfig {
        RaffleConfig {
            is_initialized: true,
            entrance_fee: FEE,
            draw_interval: INTERVAL,
            coordinator: Pubkey::new_unique(),
            oracle_authority: Pubkey::new_unique(),
            key_hash: [9u8; 32],
            subscription_id: 77,
            callback_compute_limit: 500_000,
            request_confirmations: DEFAULT_REQUEST_CONFIRMATIONS,
            num_words: DEFAULT_NUM_WORDS,
            max_players: 16,
        }
    }

    fn with_entrants(config: &RaffleConfig, count: usize) -> (RaffleState, Vec<Pubkey>) {
        let mut state = RaffleState::new(START);
        let entrants: Vec<Pubkey> = (0..count).map(|_| Pubkey::new_unique()).collect();
        for entrant in &entrants {
            enter(config, &mut state, *entrant, FEE).unwrap();
        }
        (state, entrants)
    }

    fn drawing(config: &RaffleConfig, count: usize) -> (RaffleState, Vec<Pubkey>, u64) {
        let (mut state, entrants) = with_entrants(config, count);
        let mut oracle = MockOracle::default();
        initiate_draw(config, &mut state, START + INTERVAL, &mut oracle).unwrap();
        (state, entrants, oracle.last_id)
    }

    #[test]
    fn entries_accumulate_players_and_balance() {
        let config = config();
        let mut state = RaffleState::new(START);
        let payments = [10u64, 25, 10, 1_000];
        let mut expected = 0;
        for (i, amount) in payments.iter().enumerate() {
            let entrant = Pubkey::new_unique();
            let event = enter(&config, &mut state, entrant, *amount).unwrap();
            expected += amount;
            assert_eq!(
                event,
                RaffleEvent::EntryRecorded {
                    entrant,
                    total_players: i as u64 + 1
                }
            );
        }
        assert_eq!(state.number_of_players(), 4);
        assert_eq!(state.accumulated_balance, expected);
    }

    #[test]
    fn same_entrant_takes_one_slot_per_entry() {
        let config = config();
        let mut state = RaffleState::new(START);
        let entrant = Pubkey::new_unique();
        enter(&config, &mut state, entrant, FEE).unwrap();
        enter(&config, &mut state, entrant, FEE).unwrap();
        assert_eq!(state.player(0), Some(&entrant));
        assert_eq!(state.player(1), Some(&entrant));
        assert_eq!(state.player(2), None);
    }

    #[test]
    fn underpaying_entry_is_rejected() {
        let config = config();
        let (mut state, _) = with_entrants(&config, 1);
        let before = state.clone();
        assert_eq!(
            enter(&config, &mut state, Pubkey::new_unique(), FEE - 1),
            Err(RaffleError::InsufficientPayment)
        );
        assert_eq!(state, before);
    }

    #[test]
    fn entry_while_drawing_is_rejected() {
        let config = config();
        let (mut state, _, _) = drawing(&config, 2);
        let before = state.clone();
        assert_eq!(
            enter(&config, &mut state, Pubkey::new_unique(), FEE),
            Err(RaffleError::RaffleNotOpen)
        );
        assert_eq!(state, before);
    }

    #[test]
    fn underpaying_is_reported_before_closed_round() {
        let config = config();
        let (mut state, _, _) = drawing(&config, 1);
        assert_eq!(
            enter(&config, &mut state, Pubkey::new_unique(), 0),
            Err(RaffleError::InsufficientPayment)
        );
    }

    #[test]
    fn full_raffle_rejects_entries() {
        let mut config = config();
        config.max_players = 2;
        let (mut state, _) = with_entrants(&config, 2);
        assert_eq!(
            enter(&config, &mut state, Pubkey::new_unique(), FEE),
            Err(RaffleError::RaffleFull)
        );
        assert_eq!(state.number_of_players(), 2);
    }

    #[test]
    fn pool_overflow_is_rejected() {
        let config = config();
        let mut state = RaffleState::new(START);
        enter(&config, &mut state, Pubkey::new_unique(), u64::MAX).unwrap();
        assert_eq!(
            enter(&config, &mut state, Pubkey::new_unique(), FEE),
            Err(RaffleError::AmountOverflow)
        );
        assert_eq!(state.number_of_players(), 1);
    }

    #[test]
    fn eligibility_requires_every_condition() {
        let config = config();

        let empty = RaffleState::new(START);
        assert!(!check_eligibility(&config, &empty, START + INTERVAL, b"").upkeep_needed);

        let (state, _) = with_entrants(&config, 1);
        assert!(!check_eligibility(&config, &state, START + INTERVAL - 1, b"").upkeep_needed);
        assert!(check_eligibility(&config, &state, START + INTERVAL, b"").upkeep_needed);

        let mut no_balance = state.clone();
        no_balance.accumulated_balance = 0;
        assert!(!check_eligibility(&config, &no_balance, START + INTERVAL, b"").upkeep_needed);

        let (drawing_state, _, _) = drawing(&config, 1);
        assert!(
            !check_eligibility(&config, &drawing_state, START + 10 * INTERVAL, b"").upkeep_needed
        );
    }

    #[test]
    fn eligibility_echoes_payload() {
        let config = config();
        let (state, _) = with_entrants(&config, 1);
        let check = check_eligibility(&config, &state, START, b"off-chain tag");
        assert!(!check.upkeep_needed);
        assert_eq!(check.perform_data, b"off-chain tag".to_vec());
    }

    #[test]
    fn draw_without_players_is_not_needed() {
        let config = config();
        let mut state = RaffleState::new(START);
        let mut oracle = MockOracle::default();
        assert_eq!(
            initiate_draw(&config, &mut state, START + INTERVAL, &mut oracle),
            Err(RaffleError::UpkeepNotNeeded {
                phase: RafflePhase::Open,
                player_count: 0,
                balance: 0,
            })
        );
        assert!(oracle.requests.is_empty());
    }

    #[test]
    fn draw_before_interval_is_not_needed() {
        let config = config();
        let (mut state, _) = with_entrants(&config, 3);
        let before = state.clone();
        let mut oracle = MockOracle::default();
        assert_eq!(
            initiate_draw(&config, &mut state, START + INTERVAL - 1, &mut oracle),
            Err(RaffleError::UpkeepNotNeeded {
                phase: RafflePhase::Open,
                player_count: 3,
                balance: 3 * FEE,
            })
        );
        assert_eq!(state, before);
    }

    #[test]
    fn draw_requests_randomness_once() {
        let config = config();
        let (mut state, _) = with_entrants(&config, 2);
        let mut oracle = MockOracle::default();

        let event = initiate_draw(&config, &mut state, START + INTERVAL, &mut oracle).unwrap();
        assert_eq!(event, RaffleEvent::DrawRequested { request_id: 1 });
        assert_eq!(state.phase, RafflePhase::Drawing);
        assert_eq!(state.pending_request, Some(1));
        assert_eq!(
            oracle.requests,
            vec![DrawRequest {
                key_hash: config.key_hash,
                subscription_id: config.subscription_id,
                request_confirmations: config.request_confirmations,
                callback_compute_limit: config.callback_compute_limit,
                num_words: config.num_words,
            }]
        );

        // a second trigger while the first request is outstanding
        assert_eq!(
            initiate_draw(&config, &mut state, START + 2 * INTERVAL, &mut oracle),
            Err(RaffleError::UpkeepNotNeeded {
                phase: RafflePhase::Drawing,
                player_count: 2,
                balance: 2 * FEE,
            })
        );
        assert_eq!(oracle.requests.len(), 1);
        assert_eq!(state.pending_request, Some(1));
    }

    #[test]
    fn failed_request_keeps_round_open() {
        let config = config();
        let (mut state, _) = with_entrants(&config, 2);
        let before = state.clone();
        let mut oracle = MockOracle {
            offline: true,
            ..MockOracle::default()
        };
        assert_eq!(
            initiate_draw(&config, &mut state, START + INTERVAL, &mut oracle),
            Err(RaffleError::RandomnessRequestFailed)
        );
        assert_eq!(state, before);
    }

    #[test]
    fn four_entrants_third_one_wins() {
        let config = config();
        let (mut state, entrants, request_id) = drawing(&config, 4);
        let mut payout = MockPayout::default();
        let settled_at = START + INTERVAL + 5;

        let event = settle_draw(
            &config,
            &mut state,
            &config.oracle_authority,
            request_id,
            &[word_from_u64(42)],
            settled_at,
            &mut payout,
        )
        .unwrap();

        assert_eq!(
            event,
            RaffleEvent::WinnerPicked {
                winner: entrants[2],
                prize: 40
            }
        );
        assert_eq!(payout.paid, vec![(entrants[2], 40)]);
        assert_eq!(state.recent_winner, Some(entrants[2]));
        assert!(state.players.is_empty());
        assert_eq!(state.phase, RafflePhase::Open);
        assert_eq!(state.pending_request, None);
        assert_eq!(state.accumulated_balance, 0);
        assert_eq!(state.last_draw_timestamp, settled_at);
    }

    #[test]
    fn winner_is_first_word_modulo_pool() {
        let config = config();
        for (count, word) in [(1usize, 99u64), (3, 7), (5, 1_000_003)] {
            let (mut state, entrants, request_id) = drawing(&config, count);
            let mut payout = MockPayout::default();
            settle_draw(
                &config,
                &mut state,
                &config.oracle_authority,
                request_id,
                &[word_from_u64(word), word_from_u64(0)],
                START + INTERVAL,
                &mut payout,
            )
            .unwrap();
            assert_eq!(
                state.recent_winner,
                Some(entrants[(word % count as u64) as usize])
            );
        }
    }

    #[test]
    fn settlement_from_stranger_is_rejected() {
        let config = config();
        let (mut state, _, request_id) = drawing(&config, 2);
        let before = state.clone();
        let mut payout = MockPayout::default();
        assert_eq!(
            settle_draw(
                &config,
                &mut state,
                &Pubkey::new_unique(),
                request_id,
                &[word_from_u64(1)],
                START + INTERVAL,
                &mut payout,
            ),
            Err(RaffleError::UnauthorizedCallback)
        );
        assert_eq!(state, before);
        assert!(payout.paid.is_empty());
    }

    #[test]
    fn settlement_for_other_request_is_rejected() {
        let config = config();
        let (mut state, _, request_id) = drawing(&config, 2);
        let before = state.clone();
        let mut payout = MockPayout::default();
        assert_eq!(
            settle_draw(
                &config,
                &mut state,
                &config.oracle_authority,
                request_id + 1,
                &[word_from_u64(1)],
                START + INTERVAL,
                &mut payout,
            ),
            Err(RaffleError::UnknownRequest)
        );
        assert_eq!(state, before);
    }

    #[test]
    fn settlement_while_open_is_rejected() {
        let config = config();
        let (mut state, _) = with_entrants(&config, 2);
        let mut payout = MockPayout::default();
        assert_eq!(
            settle_draw(
                &config,
                &mut state,
                &config.oracle_authority,
                1,
                &[word_from_u64(1)],
                START + INTERVAL,
                &mut payout,
            ),
            Err(RaffleError::UnknownRequest)
        );
    }

    #[test]
    fn replayed_settlement_is_rejected() {
        let config = config();
        let (mut state, _, request_id) = drawing(&config, 3);
        let mut payout = MockPayout::default();
        let words = [word_from_u64(5)];
        settle_draw(
            &config,
            &mut state,
            &config.oracle_authority,
            request_id,
            &words,
            START + INTERVAL,
            &mut payout,
        )
        .unwrap();
        let after_first = state.clone();

        assert_eq!(
            settle_draw(
                &config,
                &mut state,
                &config.oracle_authority,
                request_id,
                &words,
                START + INTERVAL + 1,
                &mut payout,
            ),
            Err(RaffleError::UnknownRequest)
        );
        assert_eq!(state, after_first);
        assert_eq!(payout.paid.len(), 1);
    }

    #[test]
    fn settlement_without_words_is_rejected() {
        let config = config();
        let (mut state, _, request_id) = drawing(&config, 2);
        let before = state.clone();
        let mut payout = MockPayout::default();
        assert_eq!(
            settle_draw(
                &config,
                &mut state,
                &config.oracle_authority,
                request_id,
                &[],
                START + INTERVAL,
                &mut payout,
            ),
            Err(RaffleError::MissingRandomness)
        );
        assert_eq!(state, before);
    }

    #[test]
    fn failed_payout_leaves_draw_pending() {
        let config = config();
        let (mut state, entrants, request_id) = drawing(&config, 4);
        let before = state.clone();
        let words = [word_from_u64(42)];
        let mut payout = MockPayout {
            reject: true,
            ..MockPayout::default()
        };

        assert_eq!(
            settle_draw(
                &config,
                &mut state,
                &config.oracle_authority,
                request_id,
                &words,
                START + INTERVAL,
                &mut payout,
            ),
            Err(RaffleError::PayoutFailed)
        );
        assert_eq!(state, before);
        assert_eq!(state.phase, RafflePhase::Drawing);
        assert_eq!(state.pending_request, Some(request_id));
        assert_eq!(state.players, entrants);

        // the same callback goes through once the recipient accepts funds
        payout.reject = false;
        settle_draw(
            &config,
            &mut state,
            &config.oracle_authority,
            request_id,
            &words,
            START + INTERVAL,
            &mut payout,
        )
        .unwrap();
        assert_eq!(payout.paid, vec![(entrants[2], 40)]);
        assert_eq!(state.phase, RafflePhase::Open);
    }

    #[test]
    fn rounds_repeat() {
        let config = config();
        let mut state = RaffleState::new(START);
        let mut oracle = MockOracle::default();
        let mut payout = MockPayout::default();
        let mut now = START;

        for round in 1..=3u64 {
            for _ in 0..round {
                enter(&config, &mut state, Pubkey::new_unique(), FEE).unwrap();
            }
            now += INTERVAL;
            initiate_draw(&config, &mut state, now, &mut oracle).unwrap();
            settle_draw(
                &config,
                &mut state,
                &config.oracle_authority,
                oracle.last_id,
                &[word_from_u64(round)],
                now,
                &mut payout,
            )
            .unwrap();
            assert_eq!(state.phase, RafflePhase::Open);
            // the interval restarts from the settlement
            assert_eq!(state.last_draw_timestamp, now);
        }
        let paid: Vec<u64> = payout.paid.iter().map(|(_, amount)| *amount).collect();
        assert_eq!(paid, vec![FEE, 2 * FEE, 3 * FEE]);
        assert_eq!(oracle.last_id, 3);
    }
}
