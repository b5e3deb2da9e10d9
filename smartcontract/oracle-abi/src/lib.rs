// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

/*! ABI definitions for the external oracles consumed by the Raffle application */

use async_graphql::{Request, Response};
use linera_sdk::linera_base_types::{ContractAbi, ServiceAbi};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

/// Identifier handed out by the randomness coordinator, unique per request.
pub type RequestId = BigUint;

/// A single 256-bit random word.
pub type RandomWord = BigUint;

// ========================================
// Price feed ABI
// ========================================

/// One answer of a price feed, in the feed's own fixed-point scale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRound {
    pub round_id: u64,
    /// Signed answer; anything non-positive is unusable.
    pub answer: i128,
    /// Number of decimals `answer` is scaled by.
    pub decimals: u8,
    pub started_at: u64,
    /// Microseconds since the epoch; zero means the round never completed.
    pub updated_at: u64,
}

#[derive(Debug, Deserialize, Serialize)]
pub enum PriceFeedOperation {
    LatestRoundData,
}

#[derive(Debug, Deserialize, Serialize)]
pub enum PriceFeedResponse {
    /// `None` when the feed has no answer yet.
    LatestRoundData(Option<PriceRound>),
}

pub struct PriceFeedAbi;

impl ContractAbi for PriceFeedAbi {
    type Operation = PriceFeedOperation;
    type Response = PriceFeedResponse;
}

impl ServiceAbi for PriceFeedAbi {
    type Query = Request;
    type QueryResponse = Response;
}

// ========================================
// Randomness coordinator ABI
// ========================================

/// Key configuration sent with every randomness request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomnessKeyConfig {
    pub key_hash: [u8; 32],
    pub subscription_id: u64,
    pub request_confirmations: u16,
    pub callback_gas_limit: u32,
}

#[derive(Debug, Deserialize, Serialize)]
pub enum RandomnessCoordinatorOperation {
    /// Ask for `num_words` random words. The coordinator later answers by
    /// calling the requesting application with the returned request id.
    RequestRandomWords {
        key_config: RandomnessKeyConfig,
        num_words: u32,
    },
}

#[derive(Debug, Deserialize, Serialize)]
pub enum RandomnessCoordinatorResponse {
    RequestId(RequestId),
}

pub struct RandomnessCoordinatorAbi;

impl ContractAbi for RandomnessCoordinatorAbi {
    type Operation = RandomnessCoordinatorOperation;
    type Response = RandomnessCoordinatorResponse;
}

impl ServiceAbi for RandomnessCoordinatorAbi {
    type Query = Request;
    type QueryResponse = Response;
}
