// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

/*! Shared ABI definitions for the Raffle Application */

use async_graphql::{Request, Response, SimpleObject};
use linera_sdk::linera_base_types::{AccountOwner, Amount, ApplicationId, ContractAbi, ServiceAbi};
use serde::{Deserialize, Serialize};

pub use oracle_abi::{RandomWord, RandomnessKeyConfig, RequestId};

/// Lifecycle of the single round held by the application.
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, async_graphql::Enum)]
pub enum Phase {
    #[default]
    Open,               // Accepting entries
    AwaitingRandomness, // Full, waiting for the coordinator's fulfillment
}

/// Fixed at application creation.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RaffleParameters {
    pub price_feed_app_id: ApplicationId,
    pub randomness_app_id: ApplicationId,
    pub key_config: RandomnessKeyConfig,
}

/// Initial round configuration; the instantiating signer becomes the administrator.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RaffleInstantiation {
    /// USD value with 18 decimals.
    pub entry_fee_usd: Amount,
    pub max_players: u32,
    pub max_price_age_micros: Option<u64>,
}

pub struct RaffleAbi;

impl ContractAbi for RaffleAbi {
    type Operation = RaffleOperation;
    type Response = RaffleResponse;
}

impl ServiceAbi for RaffleAbi {
    type Query = Request;
    type QueryResponse = Response;
}

#[derive(Debug, Deserialize, Serialize)]
pub enum RaffleOperation {
    /// Join the open round, paying `amount` from `owner`'s account
    Enter { owner: AccountOwner, amount: Amount },
    /// Randomness callback (called by the coordinator application)
    FulfillRandomWords {
        request_id: RequestId,
        random_words: Vec<RandomWord>,
    },
    /// Current entry fee in native tokens
    RequiredFee,

    // Administration
    SetMaxPlayers { max_players: u32 },
    SetEntryFeeUsd { entry_fee_usd: Amount },
    SetMaxPriceAge { max_price_age_micros: Option<u64> },
    RetrySettlement,
    ArchiveRequests { keep_last: u64 },
}

#[derive(Debug, Deserialize, Serialize)]
pub enum RaffleResponse {
    Ok,
    Entered {
        player_count: u32,
        request_id: Option<RequestId>,
    },
    RequiredFee(Amount),
    Settled(Settlement),
    SettlementStalled {
        request_id: RequestId,
        winner: AccountOwner,
        amount: Amount,
    },
    Archived(Vec<ArchivedRequest>),
}

/// Outcome of a completed round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub round: u64,
    pub request_id: RequestId,
    pub winner: AccountOwner,
    pub winner_index: u64,
    pub amount: Amount,
}

/// A fulfilled ledger entry removed from the application's storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedRequest {
    pub request_id: RequestId,
    pub random_words: Vec<RandomWord>,
}

/// Audit events appended to the application's event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RaffleEvent {
    RandomnessRequested {
        request_id: RequestId,
        num_words: u32,
    },
    RandomnessFulfilled {
        request_id: RequestId,
        random_words: Vec<RandomWord>,
    },
    RoundSettled(Settlement),
    SettlementStalled {
        request_id: RequestId,
        winner: AccountOwner,
        amount: Amount,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, async_graphql::Enum)]
pub enum RaffleEventKind {
    RandomnessRequested,
    RandomnessFulfilled,
    RoundSettled,
    SettlementStalled,
}

/// Flattened event for GraphQL queries. 256-bit values are decimal strings.
#[derive(Debug, Clone, Serialize, Deserialize, SimpleObject)]
pub struct RaffleEventView {
    pub kind: RaffleEventKind,
    pub request_id: String,
    pub random_words: Vec<String>,
    pub round: Option<u64>,
    pub winner: Option<AccountOwner>,
    pub amount: Option<Amount>,
}

impl From<&RaffleEvent> for RaffleEventView {
    fn from(event: &RaffleEvent) -> Self {
        match event {
            RaffleEvent::RandomnessRequested { request_id, .. } => RaffleEventView {
                kind: RaffleEventKind::RandomnessRequested,
                request_id: request_id.to_string(),
                random_words: Vec::new(),
                round: None,
                winner: None,
                amount: None,
            },
            RaffleEvent::RandomnessFulfilled {
                request_id,
                random_words,
            } => RaffleEventView {
                kind: RaffleEventKind::RandomnessFulfilled,
                request_id: request_id.to_string(),
                random_words: random_words.iter().map(ToString::to_string).collect(),
                round: None,
                winner: None,
                amount: None,
            },
            RaffleEvent::RoundSettled(settlement) => RaffleEventView {
                kind: RaffleEventKind::RoundSettled,
                request_id: settlement.request_id.to_string(),
                random_words: Vec::new(),
                round: Some(settlement.round),
                winner: Some(settlement.winner),
                amount: Some(settlement.amount),
            },
            RaffleEvent::SettlementStalled {
                request_id,
                winner,
                amount,
            } => RaffleEventView {
                kind: RaffleEventKind::SettlementStalled,
                request_id: request_id.to_string(),
                random_words: Vec::new(),
                round: None,
                winner: Some(*winner),
                amount: Some(*amount),
            },
        }
    }
}

/// Status of one randomness request for GraphQL queries.
#[derive(Debug, Clone, Serialize, Deserialize, SimpleObject)]
pub struct RequestStatusView {
    pub request_id: String,
    pub fulfilled: bool,
    pub random_words: Vec<String>,
}
