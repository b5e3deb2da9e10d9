// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use linera_sdk::linera_base_types::Amount;
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use oracle_abi::PriceRound;

use crate::error::RaffleError;

/// Both the USD fee and the normalized rate carry 18 decimals.
pub const DECIMALS: u8 = 18;

fn scale() -> BigUint {
    BigUint::from(10u32).pow(u32::from(DECIMALS))
}

/// Validates a feed answer and rescales it to 18 decimals.
/// `max_age_micros` of `None` disables the staleness check.
pub fn normalized_rate(
    round: Option<PriceRound>,
    now: u64,
    max_age_micros: Option<u64>,
) -> Result<BigUint, RaffleError> {
    let round = round.ok_or(RaffleError::OracleDataUnavailable)?;
    if round.updated_at == 0 {
        return Err(RaffleError::OracleDataUnavailable);
    }
    if round.answer <= 0 {
        return Err(RaffleError::NonPositivePrice(round.answer));
    }
    if let Some(max_age) = max_age_micros {
        if now.saturating_sub(round.updated_at) > max_age {
            return Err(RaffleError::StalePrice {
                updated_at: round.updated_at,
                now,
            });
        }
    }

    let answer = BigUint::from(round.answer.unsigned_abs());
    let rate = if round.decimals <= DECIMALS {
        answer * BigUint::from(10u32).pow(u32::from(DECIMALS - round.decimals))
    } else {
        answer / BigUint::from(10u32).pow(u32::from(round.decimals - DECIMALS))
    };

    if rate.is_zero() {
        return Err(RaffleError::NonPositivePrice(0));
    }
    Ok(rate)
}

/// `entry_fee_usd * 10^18 / rate`, truncated toward zero.
pub fn cost_to_enter(entry_fee_usd: Amount, rate: &BigUint) -> Result<Amount, RaffleError> {
    if rate.is_zero() {
        return Err(RaffleError::NonPositivePrice(0));
    }
    // Using BigUint so large fees cannot overflow before the division
    let fee = BigUint::from(u128::from(entry_fee_usd)) * scale();
    let cost = fee / rate;
    cost.to_u128()
        .map(Amount::from_attos)
        .ok_or(RaffleError::FeeOverflow)
}
