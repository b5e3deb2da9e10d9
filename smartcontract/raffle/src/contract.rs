// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(target_arch = "wasm32", no_main)]

mod state;

use linera_sdk::{
    linera_base_types::{Account, AccountOwner, Amount, WithContractAbi},
    views::{MapView, QueueView, RootView, View, ViewError},
    Contract, ContractRuntime,
};
use oracle_abi::{
    PriceFeedAbi, PriceFeedOperation, PriceFeedResponse, PriceRound, RandomnessCoordinatorAbi,
    RandomnessCoordinatorOperation, RandomnessCoordinatorResponse,
};
use raffle::{
    error::RaffleError,
    ledger::{RequestLedger, RequestStatus},
    oracle::{PriceOracle, RandomnessOracle, Treasury},
    round::{ensure_coordinator, settlement_response, LotteryRound, RoundState},
    RaffleAbi, RaffleEvent, RaffleInstantiation, RaffleOperation, RaffleParameters,
    RaffleResponse, RequestId,
};
use self::state::RaffleState;

pub struct RaffleContract {
    state: RaffleState,
    runtime: ContractRuntime<Self>,
}

linera_sdk::contract!(RaffleContract);

impl WithContractAbi for RaffleContract {
    type Abi = RaffleAbi;
}

impl Contract for RaffleContract {
    type Message = ();
    type Parameters = RaffleParameters;
    type InstantiationArgument = RaffleInstantiation;
    type EventValue = ();

    async fn load(runtime: ContractRuntime<Self>) -> Self {
        let state = RaffleState::load(runtime.root_view_storage_context())
            .await
            .expect("Failed to load state");
        RaffleContract { state, runtime }
    }

    async fn instantiate(&mut self, argument: Self::InstantiationArgument) {
        // Validate params access
        let _ = self.runtime.application_parameters();

        let admin = self
            .runtime
            .authenticated_signer()
            .expect("Raffle instantiation must be signed by its administrator");
        match RoundState::new(admin, argument) {
            Ok(round) => self.state.round.set(round),
            Err(e) => panic!("Invalid raffle configuration: {}", e),
        }
    }

    async fn execute_operation(&mut self, operation: Self::Operation) -> Self::Response {
        // Panicking discards every change made by the operation
        match self.execute(operation).await {
            Ok(response) => response,
            Err(e) => panic!("Raffle operation rejected ({:?}): {}", e.kind(), e),
        }
    }

    async fn execute_message(&mut self, _message: Self::Message) {
        // No messages expected; the coordinator answers through an application call
    }

    async fn store(mut self) {
        self.state.save().await.expect("Failed to save state");
    }
}

impl RaffleContract {
    async fn execute(&mut self, operation: RaffleOperation) -> Result<RaffleResponse, RaffleError> {
        let now = self.runtime.system_time().micros();
        let signer = self.runtime.authenticated_signer();

        match operation {
            RaffleOperation::Enter { owner, amount } => {
                self.runtime
                    .check_account_permission(owner)
                    .map_err(|_| RaffleError::Unauthorized)?;

                let mut round = self.round();
                let result = round.enter(owner, amount, now);
                let parts = round.into_parts();
                self.store_round(parts);

                let receipt = result?;
                self.collect_payment(owner, amount);
                log::info!("{} entered with {} ({} players)", owner, amount, receipt.player_count);

                Ok(RaffleResponse::Entered {
                    player_count: receipt.player_count,
                    request_id: receipt.request_id,
                })
            }

            RaffleOperation::FulfillRandomWords {
                request_id,
                random_words,
            } => {
                let coordinator = self.runtime.application_parameters().randomness_app_id;
                ensure_coordinator(self.runtime.authenticated_caller_id(), coordinator)?;

                let mut round = self.round();
                let result = round.on_fulfilled(request_id.clone(), random_words).await;
                let parts = round.into_parts();
                self.store_round(parts);
                settlement_response(request_id, result)
            }

            RaffleOperation::RequiredFee => {
                let fee = self.round().required_fee(now)?;
                Ok(RaffleResponse::RequiredFee(fee))
            }

            RaffleOperation::SetMaxPlayers { max_players } => {
                let mut round = self.round();
                round.set_max_players(signer, max_players)?;
                let parts = round.into_parts();
                self.store_round(parts);
                Ok(RaffleResponse::Ok)
            }

            RaffleOperation::SetEntryFeeUsd { entry_fee_usd } => {
                let mut round = self.round();
                round.set_entry_fee_usd(signer, entry_fee_usd)?;
                let parts = round.into_parts();
                self.store_round(parts);
                Ok(RaffleResponse::Ok)
            }

            RaffleOperation::SetMaxPriceAge {
                max_price_age_micros,
            } => {
                let mut round = self.round();
                round.set_max_price_age(signer, max_price_age_micros)?;
                let parts = round.into_parts();
                self.store_round(parts);
                Ok(RaffleResponse::Ok)
            }

            RaffleOperation::RetrySettlement => {
                let request_id = self
                    .state
                    .round
                    .get()
                    .stalled_request
                    .clone()
                    .ok_or(RaffleError::NoStalledSettlement)?;

                let mut round = self.round();
                let result = round.retry_settlement(signer).await;
                let parts = round.into_parts();
                self.store_round(parts);
                settlement_response(request_id, result)
            }

            RaffleOperation::ArchiveRequests { keep_last } => {
                let mut round = self.round();
                let archived = round.archive_requests(signer, keep_last).await?;
                let parts = round.into_parts();
                self.store_round(parts);
                Ok(RaffleResponse::Archived(archived))
            }
        }
    }

    /// The stored round, wired to the runtime and the request ledger views.
    fn round(&mut self) -> LotteryRound<RuntimeOracles<'_>, StoredRequests<'_>> {
        let parameters = self.runtime.application_parameters();
        LotteryRound::new(
            self.state.round.get().clone(),
            RuntimeOracles {
                runtime: &mut self.runtime,
                parameters,
            },
            StoredRequests {
                statuses: &mut self.state.request_statuses,
                history: &mut self.state.request_history,
            },
        )
    }

    /// Writes the round back, also after an error: a stalled settlement must
    /// survive, and any other error panics before the state is saved.
    fn store_round(&mut self, (round, events): (RoundState, Vec<RaffleEvent>)) {
        self.state.round.set(round);
        self.state.record_events(events);
    }

    /// Moves the entry payment into the chain account holding the pot.
    fn collect_payment(&mut self, owner: AccountOwner, amount: Amount) {
        let pot = Account {
            chain_id: self.runtime.chain_id(),
            owner: AccountOwner::CHAIN,
        };
        self.runtime.transfer(owner, pot, amount);
    }
}

/// The round's collaborators, reached through the contract runtime.
struct RuntimeOracles<'a> {
    runtime: &'a mut ContractRuntime<RaffleContract>,
    parameters: RaffleParameters,
}

impl PriceOracle for RuntimeOracles<'_> {
    fn latest_rate(&mut self) -> Option<PriceRound> {
        let price_feed = self.parameters.price_feed_app_id.with_abi::<PriceFeedAbi>();
        let response: PriceFeedResponse =
            self.runtime
                .call_application(false, price_feed, &PriceFeedOperation::LatestRoundData);
        match response {
            PriceFeedResponse::LatestRoundData(round) => round,
        }
    }
}

impl RandomnessOracle for RuntimeOracles<'_> {
    fn request_random_words(&mut self, num_words: u32) -> Result<RequestId, RaffleError> {
        let coordinator = self
            .parameters
            .randomness_app_id
            .with_abi::<RandomnessCoordinatorAbi>();
        // Authenticated so the coordinator knows which application to call back
        let response: RandomnessCoordinatorResponse = self.runtime.call_application(
            true,
            coordinator,
            &RandomnessCoordinatorOperation::RequestRandomWords {
                key_config: self.parameters.key_config,
                num_words,
            },
        );
        match response {
            RandomnessCoordinatorResponse::RequestId(request_id) => Ok(request_id),
        }
    }
}

impl Treasury for RuntimeOracles<'_> {
    fn pay(&mut self, winner: AccountOwner, amount: Amount) -> Result<(), RaffleError> {
        if self.runtime.chain_balance() < amount {
            return Err(RaffleError::TransferFailed { winner, amount });
        }
        let destination = Account {
            chain_id: self.runtime.chain_id(),
            owner: winner,
        };
        self.runtime.transfer(AccountOwner::CHAIN, destination, amount);
        Ok(())
    }
}

/// The request ledger over the application's views.
struct StoredRequests<'a> {
    statuses: &'a mut MapView<RequestId, RequestStatus>,
    history: &'a mut QueueView<RequestId>,
}

fn storage_error(error: ViewError) -> RaffleError {
    RaffleError::Storage(error.to_string())
}

impl RequestLedger for StoredRequests<'_> {
    async fn load(&self, request_id: &RequestId) -> Result<Option<RequestStatus>, RaffleError> {
        self.statuses.get(request_id).await.map_err(storage_error)
    }

    fn save(&mut self, request_id: &RequestId, status: RequestStatus) -> Result<(), RaffleError> {
        self.statuses.insert(request_id, status).map_err(storage_error)
    }

    fn remove(&mut self, request_id: &RequestId) -> Result<(), RaffleError> {
        self.statuses.remove(request_id).map_err(storage_error)
    }

    fn push_history(&mut self, request_id: RequestId) {
        self.history.push_back(request_id);
    }

    fn pop_history(&mut self) {
        self.history.delete_front();
    }

    fn history_len(&self) -> usize {
        self.history.count()
    }

    async fn request_ids(&self, from: usize, limit: usize) -> Result<Vec<RequestId>, RaffleError> {
        let ids = self
            .history
            .read_front(from.saturating_add(limit))
            .await
            .map_err(storage_error)?;
        Ok(ids.into_iter().skip(from).collect())
    }
}
