// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Collaborators the round depends on. The contract implements them over the
//! Linera runtime; tests substitute in-memory doubles.

use linera_sdk::linera_base_types::{AccountOwner, Amount};
use oracle_abi::{PriceRound, RequestId};

use crate::error::RaffleError;

pub trait PriceOracle {
    /// Latest answer of the native-token/USD feed, `None` if there is none.
    fn latest_rate(&mut self) -> Option<PriceRound>;
}

pub trait RandomnessOracle {
    /// Issues a request for `num_words` random words and returns its id.
    /// The words arrive later through the fulfillment callback.
    fn request_random_words(&mut self, num_words: u32) -> Result<RequestId, RaffleError>;
}

pub trait Treasury {
    /// Moves `amount` out of the pot to `winner`. Either the whole amount
    /// arrives or nothing moves.
    fn pay(&mut self, winner: AccountOwner, amount: Amount) -> Result<(), RaffleError>;
}
