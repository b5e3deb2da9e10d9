// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(target_arch = "wasm32", no_main)]

mod state;

use std::sync::Arc;
use async_graphql::{EmptySubscription, Object, Request, Response, Schema};
use linera_sdk::{
    linera_base_types::{AccountOwner, Amount, WithServiceAbi},
    views::View,
    Service, ServiceRuntime,
};
use raffle::{
    error::RaffleError, round::RoundState, Phase, RaffleAbi, RaffleEventView, RaffleOperation,
    RaffleParameters, RequestId, RequestStatusView,
};
use self::state::RaffleState;

/// Page size when a query does not give one
const DEFAULT_PAGE: usize = 100;

pub struct RaffleService {
    state: Arc<RaffleState>,
    runtime: Arc<ServiceRuntime<Self>>,
}

linera_sdk::service!(RaffleService);

impl WithServiceAbi for RaffleService {
    type Abi = RaffleAbi;
}

impl Service for RaffleService {
    type Parameters = RaffleParameters;

    async fn new(runtime: ServiceRuntime<Self>) -> Self {
        let state = RaffleState::load(runtime.root_view_storage_context())
            .await
            .expect("Failed to load state");
        RaffleService {
            state: Arc::new(state),
            runtime: Arc::new(runtime),
        }
    }

    async fn handle_query(&self, request: Request) -> Response {
        let schema = Schema::build(
            QueryRoot {
                state: self.state.clone(),
                runtime: self.runtime.clone(),
            },
            MutationRoot {
                runtime: self.runtime.clone(),
            },
            EmptySubscription,
        )
        .finish();
        schema.execute(request).await
    }
}

struct QueryRoot {
    state: Arc<RaffleState>,
    runtime: Arc<ServiceRuntime<RaffleService>>,
}

impl QueryRoot {
    fn round(&self) -> &RoundState {
        self.state.round.get()
    }
}

#[Object]
impl QueryRoot {
    /// Whether the round accepts entries or waits for randomness
    async fn phase(&self) -> Phase {
        self.round().phase
    }

    /// Players of the current round in entry order
    async fn players(&self) -> Vec<AccountOwner> {
        self.round().players.clone()
    }

    async fn player_count(&self) -> u32 {
        self.round().current_players()
    }

    async fn max_players(&self) -> u32 {
        self.round().config.max_players
    }

    /// Entry fee in USD (18 decimals)
    async fn entry_fee_usd(&self) -> Amount {
        self.round().config.entry_fee_usd
    }

    async fn max_price_age_micros(&self) -> Option<u64> {
        self.round().config.max_price_age_micros
    }

    /// Amount the winner of the current round receives
    async fn pot(&self) -> Amount {
        self.round().pot
    }

    async fn recent_winner(&self) -> Option<AccountOwner> {
        self.round().recent_winner
    }

    async fn rounds_settled(&self) -> u64 {
        self.round().rounds_settled
    }

    async fn administrator(&self) -> Option<AccountOwner> {
        self.round().admin
    }

    /// Fulfilled request whose payout is waiting for a retry
    async fn stalled_request(&self) -> Option<String> {
        self.round().stalled_request.as_ref().map(ToString::to_string)
    }

    async fn last_request_id(&self) -> Option<String> {
        self.round().last_request_id.as_ref().map(ToString::to_string)
    }

    /// Request ids in issue order
    async fn request_ids(
        &self,
        from: Option<usize>,
        limit: Option<usize>,
    ) -> Result<Vec<String>, async_graphql::Error> {
        let ids = self
            .state
            .get_request_ids(from.unwrap_or(0), limit.unwrap_or(DEFAULT_PAGE))
            .await
            .map_err(async_graphql::Error::new)?;
        Ok(ids.iter().map(ToString::to_string).collect())
    }

    /// Status of a randomness request; unknown ids are an error
    async fn request(&self, request_id: String) -> Result<RequestStatusView, async_graphql::Error> {
        let id = request_id
            .parse::<RequestId>()
            .map_err(|e| async_graphql::Error::new(format!("Invalid request id: {}", e)))?;
        let status = self
            .state
            .get_request_status(&id)
            .await
            .map_err(async_graphql::Error::new)?
            .ok_or_else(|| async_graphql::Error::new(RaffleError::UnknownRequest(id).to_string()))?;
        Ok(RequestStatusView {
            request_id,
            fulfilled: status.fulfilled,
            random_words: status.random_words.iter().map(ToString::to_string).collect(),
        })
    }

    /// Audit events, oldest first
    async fn events(
        &self,
        from: Option<usize>,
        limit: Option<usize>,
    ) -> Result<Vec<RaffleEventView>, async_graphql::Error> {
        let events = self
            .state
            .get_events(from.unwrap_or(0), limit.unwrap_or(DEFAULT_PAGE))
            .await
            .map_err(async_graphql::Error::new)?;
        Ok(events.iter().map(RaffleEventView::from).collect())
    }

    /// Get the configured price feed app ID
    async fn price_feed_app_id(&self) -> String {
        let params = self.runtime.application_parameters();
        format!("{}", params.price_feed_app_id)
    }

    /// Get the configured randomness coordinator app ID
    async fn randomness_app_id(&self) -> String {
        let params = self.runtime.application_parameters();
        format!("{}", params.randomness_app_id)
    }
}

fn parse_amount(value: &str) -> Result<Amount, async_graphql::Error> {
    value
        .parse::<Amount>()
        .map_err(|e| async_graphql::Error::new(format!("Invalid amount {:?}: {}", value, e)))
}

struct MutationRoot {
    runtime: Arc<ServiceRuntime<RaffleService>>,
}

#[Object]
impl MutationRoot {
    /// Enter the open round paying `amount` from `owner`
    async fn enter(&self, owner: AccountOwner, amount: String) -> Result<String, async_graphql::Error> {
        let amount = parse_amount(&amount)?;
        self.runtime.schedule_operation(&RaffleOperation::Enter { owner, amount });
        Ok("Enter operation scheduled".to_string())
    }

    async fn set_max_players(&self, max_players: u32) -> String {
        self.runtime.schedule_operation(&RaffleOperation::SetMaxPlayers { max_players });
        format!("SetMaxPlayers operation scheduled: {}", max_players)
    }

    async fn set_entry_fee_usd(&self, entry_fee_usd: String) -> Result<String, async_graphql::Error> {
        let fee = parse_amount(&entry_fee_usd)?;
        self.runtime.schedule_operation(&RaffleOperation::SetEntryFeeUsd { entry_fee_usd: fee });
        Ok(format!("SetEntryFeeUsd operation scheduled: {}", fee))
    }

    async fn set_max_price_age(&self, max_price_age_micros: Option<u64>) -> String {
        self.runtime.schedule_operation(&RaffleOperation::SetMaxPriceAge {
            max_price_age_micros,
        });
        "SetMaxPriceAge operation scheduled".to_string()
    }

    /// Retry the payout of a stalled settlement
    async fn retry_settlement(&self) -> String {
        self.runtime.schedule_operation(&RaffleOperation::RetrySettlement);
        "RetrySettlement operation scheduled".to_string()
    }

    async fn archive_requests(&self, keep_last: u64) -> String {
        self.runtime.schedule_operation(&RaffleOperation::ArchiveRequests { keep_last });
        format!("ArchiveRequests operation scheduled, keeping {}", keep_last)
    }
}
