// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

/*! Raffle Application - capacity-triggered lottery settled by external randomness */

pub mod error;
pub mod fee;
pub mod ledger;
pub mod oracle;
pub mod round;

// Re-export the ABI for the contract and service binaries
pub use raffle_abi::{
    ArchivedRequest, Phase, RaffleAbi, RaffleEvent, RaffleEventView, RaffleInstantiation,
    RaffleOperation, RaffleParameters, RaffleResponse, RandomWord, RequestId,
    RequestStatusView, Settlement,
};
