// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use linera_sdk::linera_base_types::{AccountOwner, Amount};
use raffle_abi::RequestId;
use thiserror::Error;

/// How a failure should be handled by whoever triggered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input; rejected with no state change.
    Validation,
    /// An oracle could not give a usable answer; retry later.
    Oracle,
    /// The payout could not be delivered; needs an administrator.
    FatalTransfer,
    /// Application storage could not be read or written.
    Storage,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RaffleError {
    #[error("payment of {paid} is below the required entry fee of {required}")]
    InsufficientPayment { paid: Amount, required: Amount },

    #[error("the round is full")]
    RoundFull,

    #[error("unknown randomness request {0}")]
    UnknownRequest(RequestId),

    #[error("randomness request {0} was already fulfilled")]
    AlreadyFulfilled(RequestId),

    #[error("the round configuration cannot change while players are entered")]
    RoundInProgress,

    #[error("only the administrator may do this")]
    Unauthorized,

    #[error("only the randomness coordinator may deliver random words")]
    NotCoordinator,

    #[error("max players must be at least 1")]
    InvalidMaxPlayers,

    #[error("the price feed has no usable answer")]
    OracleDataUnavailable,

    #[error("the price feed reported a non-positive rate {0}")]
    NonPositivePrice(i128),

    #[error("the price feed answer from {updated_at} is too old at {now}")]
    StalePrice { updated_at: u64, now: u64 },

    #[error("the entry fee does not fit in an amount")]
    FeeOverflow,

    #[error("the randomness fulfillment carried no words")]
    EmptyRandomness,

    #[error("the randomness fulfillment carried a zero word")]
    ZeroRandomness,

    #[error("failed to transfer {amount} to {winner}")]
    TransferFailed { winner: AccountOwner, amount: Amount },

    #[error("no settlement is waiting for a retry")]
    NoStalledSettlement,

    #[error("the pot cannot hold another {0}")]
    PotOverflow(Amount),

    #[error("storage error: {0}")]
    Storage(String),
}

impl RaffleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RaffleError::OracleDataUnavailable
            | RaffleError::NonPositivePrice(_)
            | RaffleError::StalePrice { .. }
            | RaffleError::EmptyRandomness
            | RaffleError::ZeroRandomness => ErrorKind::Oracle,
            RaffleError::TransferFailed { .. } => ErrorKind::FatalTransfer,
            RaffleError::Storage(_) => ErrorKind::Storage,
            _ => ErrorKind::Validation,
        }
    }
}
