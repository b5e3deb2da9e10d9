// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The round state machine: Open -> AwaitingRandomness -> settled -> Open.

use linera_sdk::linera_base_types::{AccountOwner, Amount, ApplicationId};
use num_traits::{ToPrimitive, Zero};
use raffle_abi::{
    ArchivedRequest, Phase, RaffleEvent, RaffleInstantiation, RaffleResponse, RandomWord,
    RequestId, Settlement,
};
use serde::{Deserialize, Serialize};

use crate::error::RaffleError;
use crate::fee;
use crate::ledger::RequestLedger;
use crate::oracle::{PriceOracle, RandomnessOracle, Treasury};

/// Random words requested per draw.
pub const NUM_WORDS: u32 = 1;

/// Mutable only while the round is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundConfig {
    /// USD value with 18 decimals.
    pub entry_fee_usd: Amount,
    pub max_players: u32,
    pub max_price_age_micros: Option<u64>,
}

/// Everything persisted between operations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoundState {
    pub admin: Option<AccountOwner>,
    pub config: RoundConfig,
    pub phase: Phase,
    /// Entry order; the same owner may appear more than once.
    pub players: Vec<AccountOwner>,
    pub pot: Amount,
    pub recent_winner: Option<AccountOwner>,
    /// Number of rounds settled so far.
    pub rounds_settled: u64,
    /// Fulfilled request whose payout failed.
    pub stalled_request: Option<RequestId>,
    pub last_request_id: Option<RequestId>,
}

impl RoundState {
    pub fn new(admin: AccountOwner, argument: RaffleInstantiation) -> Result<Self, RaffleError> {
        if argument.max_players == 0 {
            return Err(RaffleError::InvalidMaxPlayers);
        }
        Ok(RoundState {
            admin: Some(admin),
            config: RoundConfig {
                entry_fee_usd: argument.entry_fee_usd,
                max_players: argument.max_players,
                max_price_age_micros: argument.max_price_age_micros,
            },
            ..RoundState::default()
        })
    }

    pub fn current_players(&self) -> u32 {
        self.players.len() as u32
    }
}

/// Result of a successful entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryReceipt {
    pub player_count: u32,
    /// Set when this entry filled the round.
    pub request_id: Option<RequestId>,
}

/// A round bound to the collaborators and the request ledger it uses for
/// one operation.
pub struct LotteryRound<O, L> {
    state: RoundState,
    oracles: O,
    requests: L,
    events: Vec<RaffleEvent>,
}

impl<O, L> LotteryRound<O, L> {
    pub fn new(state: RoundState, oracles: O, requests: L) -> Self {
        LotteryRound {
            state,
            oracles,
            requests,
            events: Vec::new(),
        }
    }

    pub fn state(&self) -> &RoundState {
        &self.state
    }

    pub fn requests(&self) -> &L {
        &self.requests
    }

    /// Hands back the state to persist and the events emitted meanwhile.
    /// Both must be stored whatever the operation returned.
    pub fn into_parts(self) -> (RoundState, Vec<RaffleEvent>) {
        (self.state, self.events)
    }

    fn ensure_admin(&self, caller: Option<AccountOwner>) -> Result<(), RaffleError> {
        match (self.state.admin, caller) {
            (Some(admin), Some(caller)) if admin == caller => Ok(()),
            _ => Err(RaffleError::Unauthorized),
        }
    }

    fn ensure_config_mutable(&self, caller: Option<AccountOwner>) -> Result<(), RaffleError> {
        self.ensure_admin(caller)?;
        if !self.state.players.is_empty() {
            return Err(RaffleError::RoundInProgress);
        }
        Ok(())
    }

    pub fn set_max_players(
        &mut self,
        caller: Option<AccountOwner>,
        max_players: u32,
    ) -> Result<(), RaffleError> {
        self.ensure_config_mutable(caller)?;
        if max_players == 0 {
            return Err(RaffleError::InvalidMaxPlayers);
        }
        self.state.config.max_players = max_players;
        Ok(())
    }

    pub fn set_entry_fee_usd(
        &mut self,
        caller: Option<AccountOwner>,
        entry_fee_usd: Amount,
    ) -> Result<(), RaffleError> {
        self.ensure_config_mutable(caller)?;
        self.state.config.entry_fee_usd = entry_fee_usd;
        Ok(())
    }

    pub fn set_max_price_age(
        &mut self,
        caller: Option<AccountOwner>,
        max_price_age_micros: Option<u64>,
    ) -> Result<(), RaffleError> {
        self.ensure_config_mutable(caller)?;
        self.state.config.max_price_age_micros = max_price_age_micros;
        Ok(())
    }
}

impl<O, L: RequestLedger> LotteryRound<O, L> {
    /// Drops the oldest fulfilled ledger entries, returning them for export.
    /// A stalled request and everything after it stay in the ledger.
    pub async fn archive_requests(
        &mut self,
        caller: Option<AccountOwner>,
        keep_last: u64,
    ) -> Result<Vec<ArchivedRequest>, RaffleError> {
        self.ensure_admin(caller)?;
        let keep_last = usize::try_from(keep_last).unwrap_or(usize::MAX);
        let archived = self
            .requests
            .archive(keep_last, self.state.stalled_request.as_ref())
            .await?;
        log::info!("Archived {} fulfilled randomness requests", archived.len());
        Ok(archived)
    }
}

impl<O: PriceOracle, L> LotteryRound<O, L> {
    /// Entry fee in native tokens at the current feed rate.
    pub fn required_fee(&mut self, now: u64) -> Result<Amount, RaffleError> {
        let rate = fee::normalized_rate(
            self.oracles.latest_rate(),
            now,
            self.state.config.max_price_age_micros,
        )?;
        fee::cost_to_enter(self.state.config.entry_fee_usd, &rate)
    }
}

impl<O: PriceOracle + RandomnessOracle, L: RequestLedger> LotteryRound<O, L> {
    /// Admits `caller` into the open round. The entry that fills the round
    /// also issues the randomness request; if that request cannot be issued
    /// the entry is rejected and nothing changes. Overpayment is kept in the pot.
    pub fn enter(
        &mut self,
        caller: AccountOwner,
        paid: Amount,
        now: u64,
    ) -> Result<EntryReceipt, RaffleError> {
        if self.state.phase != Phase::Open
            || self.state.current_players() >= self.state.config.max_players
        {
            return Err(RaffleError::RoundFull);
        }

        let required = self.required_fee(now)?;
        if paid < required {
            return Err(RaffleError::InsufficientPayment { paid, required });
        }
        let pot = self
            .state
            .pot
            .try_add(paid)
            .map_err(|_| RaffleError::PotOverflow(paid))?;

        let fills_round = self.state.current_players() + 1 == self.state.config.max_players;
        let request_id = if fills_round {
            Some(self.oracles.request_random_words(NUM_WORDS)?)
        } else {
            None
        };

        if let Some(request_id) = &request_id {
            self.requests.record(request_id.clone())?;
        }
        self.state.players.push(caller);
        self.state.pot = pot;

        if let Some(request_id) = &request_id {
            self.state.phase = Phase::AwaitingRandomness;
            self.state.last_request_id = Some(request_id.clone());
            log::info!(
                "Round full with {} players, requested randomness {}",
                self.state.current_players(),
                request_id
            );
            self.events.push(RaffleEvent::RandomnessRequested {
                request_id: request_id.clone(),
                num_words: NUM_WORDS,
            });
        }

        Ok(EntryReceipt {
            player_count: self.state.current_players(),
            request_id,
        })
    }
}

impl<O: Treasury, L: RequestLedger> LotteryRound<O, L> {
    /// Consumes the coordinator's answer for `request_id` and settles the round.
    ///
    /// Validation failures leave everything untouched. A failed payout leaves
    /// the request fulfilled, the round in `AwaitingRandomness` and the request
    /// recorded as stalled; the caller must persist that state.
    pub async fn on_fulfilled(
        &mut self,
        request_id: RequestId,
        random_words: Vec<RandomWord>,
    ) -> Result<Settlement, RaffleError> {
        self.requests.ensure_pending(&request_id).await?;
        let first = random_words.first().ok_or(RaffleError::EmptyRandomness)?;
        if first.is_zero() {
            return Err(RaffleError::ZeroRandomness);
        }

        let random_number = first.clone();
        self.requests
            .fulfill(&request_id, random_words.clone())
            .await?;
        self.events.push(RaffleEvent::RandomnessFulfilled {
            request_id: request_id.clone(),
            random_words,
        });

        self.settle(request_id, &random_number)
    }

    /// Replays the payout of a stalled settlement.
    pub async fn retry_settlement(
        &mut self,
        caller: Option<AccountOwner>,
    ) -> Result<Settlement, RaffleError> {
        self.ensure_admin(caller)?;
        let request_id = self
            .state
            .stalled_request
            .clone()
            .ok_or(RaffleError::NoStalledSettlement)?;
        let random_number = self
            .requests
            .status(&request_id)
            .await?
            .random_words
            .first()
            .cloned()
            .ok_or(RaffleError::EmptyRandomness)?;

        log::info!("Retrying settlement of request {}", request_id);
        self.settle(request_id, &random_number)
    }

    fn settle(
        &mut self,
        request_id: RequestId,
        random_number: &RandomWord,
    ) -> Result<Settlement, RaffleError> {
        // A pending request always belongs to a full round
        let winner_index = winner_index(random_number, self.state.players.len())
            .ok_or_else(|| RaffleError::UnknownRequest(request_id.clone()))?;
        let winner = self.state.players[winner_index];
        let amount = self.state.pot;

        if let Err(error) = self.oracles.pay(winner, amount) {
            log::warn!(
                "Payout of {} to {} for request {} failed: {}",
                amount,
                winner,
                request_id,
                error
            );
            self.state.stalled_request = Some(request_id.clone());
            self.events.push(RaffleEvent::SettlementStalled {
                request_id,
                winner,
                amount,
            });
            return Err(error);
        }

        self.state.rounds_settled += 1;
        self.state.recent_winner = Some(winner);
        self.state.players.clear();
        self.state.pot = Amount::ZERO;
        self.state.phase = Phase::Open;
        self.state.stalled_request = None;

        let settlement = Settlement {
            round: self.state.rounds_settled,
            request_id,
            winner,
            winner_index: winner_index as u64,
            amount,
        };
        log::info!(
            "Round {} settled: {} won {}",
            settlement.round,
            winner,
            amount
        );
        self.events.push(RaffleEvent::RoundSettled(settlement.clone()));
        Ok(settlement)
    }
}

/// `random_number mod player_count`. Plain modulo, so the draw is only as
/// uniform as the word is wide relative to the player count.
pub fn winner_index(random_number: &RandomWord, player_count: usize) -> Option<usize> {
    if player_count == 0 {
        return None;
    }
    (random_number % RandomWord::from(player_count)).to_usize()
}

/// Response to a fulfillment or a retry. A failed payout is not an error at
/// this point: the stalled state it left behind has to be stored.
pub fn settlement_response(
    request_id: RequestId,
    result: Result<Settlement, RaffleError>,
) -> Result<RaffleResponse, RaffleError> {
    match result {
        Ok(settlement) => Ok(RaffleResponse::Settled(settlement)),
        Err(RaffleError::TransferFailed { winner, amount }) => {
            log::warn!(
                "Settlement of request {} stalled; administrator must retry",
                request_id
            );
            Ok(RaffleResponse::SettlementStalled {
                request_id,
                winner,
                amount,
            })
        }
        Err(e) => Err(e),
    }
}

/// Random words are only accepted from the configured coordinator.
pub fn ensure_coordinator(
    caller: Option<ApplicationId>,
    coordinator: ApplicationId,
) -> Result<(), RaffleError> {
    if caller != Some(coordinator) {
        return Err(RaffleError::NotCoordinator);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use linera_sdk::linera_base_types::CryptoHash;
    use oracle_abi::PriceRound;
    use rand::Rng;

    use crate::ledger::MemoryLedger;

    const NOW: u64 = 1_000_000;

    fn player(tag: u8) -> AccountOwner {
        AccountOwner::Address20([tag; 20])
    }

    /// In-memory stand-in for the feed, the coordinator and the pot.
    #[derive(Default)]
    struct FakeOracles {
        rate: Option<PriceRound>,
        next_request_id: u32,
        issued: u32,
        coordinator_down: bool,
        payouts: Vec<(AccountOwner, Amount)>,
        reject_payouts: bool,
    }

    impl FakeOracles {
        /// 2000 USD per token with 8 decimals, so a 20 USD fee costs 0.01 tokens.
        fn new() -> Self {
            FakeOracles {
                rate: Some(PriceRound {
                    round_id: 7,
                    answer: 200_000_000_000,
                    decimals: 8,
                    started_at: NOW,
                    updated_at: NOW,
                }),
                next_request_id: 100,
                ..FakeOracles::default()
            }
        }
    }

    impl PriceOracle for FakeOracles {
        fn latest_rate(&mut self) -> Option<PriceRound> {
            self.rate.clone()
        }
    }

    impl RandomnessOracle for FakeOracles {
        fn request_random_words(&mut self, num_words: u32) -> Result<RequestId, RaffleError> {
            assert_eq!(num_words, NUM_WORDS);
            if self.coordinator_down {
                return Err(RaffleError::OracleDataUnavailable);
            }
            self.issued += 1;
            self.next_request_id += 1;
            Ok(RequestId::from(self.next_request_id))
        }
    }

    impl Treasury for FakeOracles {
        fn pay(&mut self, winner: AccountOwner, amount: Amount) -> Result<(), RaffleError> {
            if self.reject_payouts {
                return Err(RaffleError::TransferFailed { winner, amount });
            }
            self.payouts.push((winner, amount));
            Ok(())
        }
    }

    type TestRound = LotteryRound<FakeOracles, MemoryLedger>;

    fn fee() -> Amount {
        Amount::from_millis(10)
    }

    fn round(max_players: u32) -> TestRound {
        let state = RoundState::new(
            player(0),
            RaffleInstantiation {
                entry_fee_usd: Amount::from_tokens(20),
                max_players,
                max_price_age_micros: Some(60_000_000),
            },
        )
        .unwrap();
        LotteryRound::new(state, FakeOracles::new(), MemoryLedger::default())
    }

    fn words(value: u32) -> Vec<RandomWord> {
        vec![RandomWord::from(value)]
    }

    async fn fulfilled(round: &TestRound, request_id: &RequestId) -> bool {
        round.requests().status(request_id).await.unwrap().fulfilled
    }

    /// Fills a two-player round and fails the payout.
    async fn stalled_round() -> (TestRound, RequestId) {
        let mut round = round(2);
        round.enter(player(1), fee(), NOW).unwrap();
        let request_id = round.enter(player(2), fee(), NOW).unwrap().request_id.unwrap();
        round.oracles.reject_payouts = true;
        assert_matches!(
            round.on_fulfilled(request_id.clone(), words(5)).await,
            Err(RaffleError::TransferFailed { .. })
        );
        (round, request_id)
    }

    #[test]
    fn test_required_fee() {
        let mut round = round(2);
        assert_eq!(round.required_fee(NOW).unwrap(), fee());

        round.oracles.rate = None;
        assert_eq!(round.required_fee(NOW), Err(RaffleError::OracleDataUnavailable));
    }

    #[tokio::test]
    async fn test_two_player_round() {
        let mut round = round(2);

        let receipt = round.enter(player(1), fee(), NOW).unwrap();
        assert_eq!(receipt.player_count, 1);
        assert_eq!(receipt.request_id, None);
        assert_eq!(round.state().phase, Phase::Open);

        let receipt = round.enter(player(2), fee(), NOW).unwrap();
        assert_eq!(receipt.player_count, 2);
        let request_id = receipt.request_id.unwrap();
        assert_eq!(round.state().phase, Phase::AwaitingRandomness);
        assert_eq!(round.state().last_request_id, Some(request_id.clone()));
        assert_eq!(round.oracles.issued, 1);

        let settlement = round.on_fulfilled(request_id.clone(), words(7)).await.unwrap();
        assert_eq!(settlement.winner_index, 1);
        assert_eq!(settlement.winner, player(2));
        assert_eq!(settlement.amount, Amount::from_millis(20));
        assert_eq!(settlement.round, 1);
        assert_eq!(round.oracles.payouts, vec![(player(2), Amount::from_millis(20))]);
        assert!(fulfilled(&round, &request_id).await);

        let state = round.state();
        assert!(state.players.is_empty());
        assert_eq!(state.current_players(), 0);
        assert_eq!(state.phase, Phase::Open);
        assert_eq!(state.pot, Amount::ZERO);
        assert_eq!(state.recent_winner, Some(player(2)));

        let (_, events) = round.into_parts();
        assert_eq!(events.len(), 3);
        assert_matches!(events[0], RaffleEvent::RandomnessRequested { num_words: 1, .. });
        assert_matches!(events[1], RaffleEvent::RandomnessFulfilled { .. });
        assert_matches!(events[2], RaffleEvent::RoundSettled(_));
    }

    #[test]
    fn test_insufficient_payment_changes_nothing() {
        let mut round = round(2);
        let paid = Amount::from_attos(u128::from(fee()) - 1);
        assert_eq!(
            round.enter(player(1), paid, NOW),
            Err(RaffleError::InsufficientPayment {
                paid,
                required: fee()
            })
        );
        assert!(round.state().players.is_empty());
        assert_eq!(round.state().pot, Amount::ZERO);
    }

    #[test]
    fn test_overpayment_is_kept_in_pot() {
        let mut round = round(3);
        round.enter(player(1), Amount::from_tokens(1), NOW).unwrap();
        assert_eq!(round.state().pot, Amount::from_tokens(1));
    }

    #[test]
    fn test_pot_overflow_is_rejected() {
        let mut round = round(3);
        round.enter(player(1), Amount::MAX, NOW).unwrap();

        assert_eq!(
            round.enter(player(2), fee(), NOW),
            Err(RaffleError::PotOverflow(fee()))
        );
        assert_eq!(round.state().players, vec![player(1)]);
        assert_eq!(round.state().pot, Amount::MAX);
    }

    #[test]
    fn test_same_owner_may_enter_twice() {
        let mut round = round(3);
        round.enter(player(1), fee(), NOW).unwrap();
        round.enter(player(1), fee(), NOW).unwrap();
        assert_eq!(round.state().players, vec![player(1), player(1)]);
    }

    #[test]
    fn test_no_entry_while_awaiting_randomness() {
        let mut round = round(1);
        round.enter(player(1), fee(), NOW).unwrap();
        assert_eq!(round.state().phase, Phase::AwaitingRandomness);

        assert_eq!(round.enter(player(2), fee(), NOW), Err(RaffleError::RoundFull));
        assert_eq!(round.state().players, vec![player(1)]);
        assert_eq!(round.oracles.issued, 1);
    }

    #[test]
    fn test_stale_price_blocks_entry() {
        let mut round = round(2);
        let later = NOW + 60_000_001;
        assert_matches!(
            round.enter(player(1), fee(), later),
            Err(RaffleError::StalePrice { .. })
        );
        assert!(round.state().players.is_empty());
    }

    #[test]
    fn test_failed_request_rejects_filling_entry() {
        let mut round = round(2);
        round.enter(player(1), fee(), NOW).unwrap();
        round.oracles.coordinator_down = true;

        assert!(round.enter(player(2), fee(), NOW).is_err());
        assert_eq!(round.state().players, vec![player(1)]);
        assert_eq!(round.state().phase, Phase::Open);
        assert_eq!(round.requests().history_len(), 0);
    }

    #[test]
    fn test_capacity_invariant() {
        let mut round = round(4);
        for tag in 1..=10u8 {
            let result = round.enter(player(tag), fee(), NOW);
            assert!(round.state().current_players() <= 4);
            if tag <= 4 {
                assert_eq!(result.unwrap().request_id.is_some(), tag == 4);
            } else {
                assert_eq!(result, Err(RaffleError::RoundFull));
            }
        }
        assert_eq!(round.oracles.issued, 1);
    }

    #[tokio::test]
    async fn test_duplicate_fulfillment_pays_once() {
        let mut round = round(1);
        let request_id = round.enter(player(1), fee(), NOW).unwrap().request_id.unwrap();
        round.on_fulfilled(request_id.clone(), words(3)).await.unwrap();

        assert_eq!(
            round.on_fulfilled(request_id.clone(), words(4)).await,
            Err(RaffleError::AlreadyFulfilled(request_id.clone()))
        );
        assert_eq!(round.oracles.payouts.len(), 1);
        assert_eq!(
            round.requests().status(&request_id).await.unwrap().random_words,
            words(3)
        );
        assert_eq!(round.state().rounds_settled, 1);
    }

    #[tokio::test]
    async fn test_unknown_request() {
        let mut round = round(1);
        round.enter(player(1), fee(), NOW).unwrap();
        let unknown = RequestId::from(999u32);
        assert_eq!(
            round.on_fulfilled(unknown.clone(), words(3)).await,
            Err(RaffleError::UnknownRequest(unknown))
        );
        assert_eq!(round.state().phase, Phase::AwaitingRandomness);
        assert!(round.oracles.payouts.is_empty());
    }

    #[tokio::test]
    async fn test_zero_and_empty_randomness_keep_request_pending() {
        let mut round = round(2);
        round.enter(player(1), fee(), NOW).unwrap();
        let request_id = round.enter(player(2), fee(), NOW).unwrap().request_id.unwrap();

        assert_eq!(
            round.on_fulfilled(request_id.clone(), words(0)).await,
            Err(RaffleError::ZeroRandomness)
        );
        assert_eq!(
            round.on_fulfilled(request_id.clone(), Vec::new()).await,
            Err(RaffleError::EmptyRandomness)
        );
        assert!(!fulfilled(&round, &request_id).await);
        assert_eq!(round.state().phase, Phase::AwaitingRandomness);

        // A later valid delivery still settles
        let settlement = round.on_fulfilled(request_id, words(8)).await.unwrap();
        assert_eq!(settlement.winner, player(1));
    }

    #[tokio::test]
    async fn test_winner_is_always_a_player() {
        for max_players in 1..=6u32 {
            let mut round = round(max_players);
            let mut request_id = None;
            for tag in 1..=max_players {
                request_id = round.enter(player(tag as u8), fee(), NOW).unwrap().request_id;
            }
            let players = round.state().players.clone();

            let bytes = rand::thread_rng().gen::<[u8; 32]>();
            let mut word = RandomWord::from_bytes_le(&bytes);
            if word.is_zero() {
                word = RandomWord::from(1u32);
            }
            let settlement = round
                .on_fulfilled(request_id.unwrap(), vec![word])
                .await
                .unwrap();
            assert!(players.contains(&settlement.winner));
            assert_eq!(players[settlement.winner_index as usize], settlement.winner);
        }
    }

    #[tokio::test]
    async fn test_rounds_repeat_with_fresh_requests() {
        let mut round = round(1);
        let first = round.enter(player(1), fee(), NOW).unwrap().request_id.unwrap();
        round.on_fulfilled(first.clone(), words(1)).await.unwrap();
        let second = round.enter(player(2), fee(), NOW).unwrap().request_id.unwrap();
        assert_ne!(first, second);
        round.on_fulfilled(second.clone(), words(1)).await.unwrap();

        assert_eq!(round.state().rounds_settled, 2);
        assert_eq!(round.state().recent_winner, Some(player(2)));
        assert_eq!(
            round.requests().request_ids(0, 10).await.unwrap(),
            vec![first, second.clone()]
        );
        assert_eq!(round.state().last_request_id, Some(second));
    }

    #[tokio::test]
    async fn test_failed_payout_stalls_settlement() {
        let (mut round, request_id) = stalled_round().await;
        let state = round.state();
        assert_eq!(state.phase, Phase::AwaitingRandomness);
        assert_eq!(state.players.len(), 2);
        assert_eq!(state.pot, Amount::from_millis(20));
        assert_eq!(state.stalled_request, Some(request_id.clone()));
        assert!(fulfilled(&round, &request_id).await);

        // Redelivery does not pay again
        assert_eq!(
            round.on_fulfilled(request_id.clone(), words(5)).await,
            Err(RaffleError::AlreadyFulfilled(request_id.clone()))
        );

        assert_eq!(
            round.retry_settlement(Some(player(9))).await,
            Err(RaffleError::Unauthorized)
        );

        round.oracles.reject_payouts = false;
        let settlement = round.retry_settlement(Some(player(0))).await.unwrap();
        assert_eq!(settlement.winner, player(2));
        assert_eq!(round.oracles.payouts, vec![(player(2), Amount::from_millis(20))]);
        assert_eq!(round.state().stalled_request, None);
        assert_eq!(round.state().phase, Phase::Open);

        assert_eq!(
            round.retry_settlement(Some(player(0))).await,
            Err(RaffleError::NoStalledSettlement)
        );
    }

    #[tokio::test]
    async fn test_stalled_state_is_handed_back_for_storage() {
        let (round, request_id) = stalled_round().await;
        let (state, events) = round.into_parts();

        assert_eq!(state.stalled_request, Some(request_id.clone()));
        assert_eq!(state.phase, Phase::AwaitingRandomness);
        assert_matches!(events.last(), Some(RaffleEvent::SettlementStalled { request_id: id, .. }) if *id == request_id);
    }

    #[tokio::test]
    async fn test_archive_keeps_stalled_request() {
        let mut round = round(1);
        let settled = round.enter(player(1), fee(), NOW).unwrap().request_id.unwrap();
        round.on_fulfilled(settled.clone(), words(2)).await.unwrap();

        let stalled = round.enter(player(2), fee(), NOW).unwrap().request_id.unwrap();
        round.oracles.reject_payouts = true;
        assert!(round.on_fulfilled(stalled.clone(), words(5)).await.is_err());

        let archived = round.archive_requests(Some(player(0)), 0).await.unwrap();
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].request_id, settled);
        assert!(fulfilled(&round, &stalled).await);

        round.oracles.reject_payouts = false;
        let settlement = round.retry_settlement(Some(player(0))).await.unwrap();
        assert_eq!(settlement.winner, player(2));
        assert_eq!(round.state().phase, Phase::Open);
        assert!(round.enter(player(3), fee(), NOW).is_ok());
    }

    #[test]
    fn test_admin_setters() {
        let mut round = round(2);
        let admin = Some(player(0));

        assert_eq!(round.set_max_players(Some(player(5)), 3), Err(RaffleError::Unauthorized));
        assert_eq!(round.set_max_players(None, 3), Err(RaffleError::Unauthorized));
        assert_eq!(round.set_max_players(admin, 0), Err(RaffleError::InvalidMaxPlayers));

        round.set_max_players(admin, 3).unwrap();
        round.set_entry_fee_usd(admin, Amount::from_tokens(40)).unwrap();
        round.set_max_price_age(admin, None).unwrap();
        assert_eq!(round.state().config.max_players, 3);
        assert_eq!(round.required_fee(NOW).unwrap(), Amount::from_millis(20));

        round.enter(player(1), Amount::from_millis(20), NOW).unwrap();
        assert_eq!(round.set_max_players(admin, 5), Err(RaffleError::RoundInProgress));
        assert_eq!(
            round.set_entry_fee_usd(admin, Amount::from_tokens(1)),
            Err(RaffleError::RoundInProgress)
        );
        assert_eq!(round.set_max_price_age(admin, Some(1)), Err(RaffleError::RoundInProgress));
        assert_eq!(round.state().config.max_players, 3);
    }

    #[tokio::test]
    async fn test_archive_requests() {
        let mut round = round(1);
        for tag in 1..=3u8 {
            let request_id = round.enter(player(tag), fee(), NOW).unwrap().request_id.unwrap();
            round.on_fulfilled(request_id, words(2)).await.unwrap();
        }
        assert_eq!(
            round.archive_requests(Some(player(4)), 0).await,
            Err(RaffleError::Unauthorized)
        );

        let archived = round.archive_requests(Some(player(0)), 1).await.unwrap();
        assert_eq!(archived.len(), 2);
        assert_eq!(round.requests().history_len(), 1);
    }

    #[test]
    fn test_zero_max_players_is_rejected_at_creation() {
        let result = RoundState::new(
            player(0),
            RaffleInstantiation {
                entry_fee_usd: Amount::from_tokens(1),
                max_players: 0,
                max_price_age_micros: None,
            },
        );
        assert_matches!(result, Err(RaffleError::InvalidMaxPlayers));
    }

    #[test]
    fn test_winner_index_is_modulo() {
        assert_eq!(winner_index(&RandomWord::from(7u32), 2), Some(1));
        assert_eq!(winner_index(&RandomWord::from(9u32), 3), Some(0));
        assert_eq!(winner_index(&RandomWord::from(9u32), 0), None);
    }

    #[test]
    fn test_settlement_response() {
        let request_id = RequestId::from(42u32);
        let settlement = Settlement {
            round: 3,
            request_id: request_id.clone(),
            winner: player(1),
            winner_index: 0,
            amount: fee(),
        };
        assert_matches!(
            settlement_response(request_id.clone(), Ok(settlement.clone())),
            Ok(RaffleResponse::Settled(s)) if s == settlement
        );

        // A failed payout is answered, so the stalled state gets stored
        let failed = Err(RaffleError::TransferFailed {
            winner: player(1),
            amount: fee(),
        });
        assert_matches!(
            settlement_response(request_id.clone(), failed),
            Ok(RaffleResponse::SettlementStalled { request_id: id, winner, amount })
                if id == request_id && winner == player(1) && amount == fee()
        );

        assert_eq!(
            settlement_response(request_id.clone(), Err(RaffleError::ZeroRandomness)).err(),
            Some(RaffleError::ZeroRandomness)
        );
    }

    #[test]
    fn test_only_the_coordinator_delivers_randomness() {
        let coordinator = ApplicationId::new(CryptoHash::from([1, 0, 0, 0]));
        let other = ApplicationId::new(CryptoHash::from([2, 0, 0, 0]));

        assert_eq!(ensure_coordinator(Some(coordinator), coordinator), Ok(()));
        assert_eq!(
            ensure_coordinator(Some(other), coordinator),
            Err(RaffleError::NotCoordinator)
        );
        assert_eq!(
            ensure_coordinator(None, coordinator),
            Err(RaffleError::NotCoordinator)
        );
    }
}
