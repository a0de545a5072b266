//! Time-to-money projection: what a stream has cost so far, in integer math.
//!
//! The indexer's aggregates only change when the contract emits an event;
//! between a create and a stop the amount owed grows every second. These
//! helpers project it from the stored rate, start time and deposit. The
//! contract remains authoritative and may disagree transiently (it settles
//! rate changes, the projection does not).

use alloy_primitives::U256;

use crate::entity::{per_minute, Stream};

/// Cost of streaming for `seconds` at `rate_per_second`.
pub fn cost_for(rate_per_second: U256, seconds: u64) -> U256 {
    rate_per_second.saturating_mul(U256::from(seconds))
}

/// Cost of one minute at `rate_per_second`.
pub fn cost_per_minute(rate_per_second: U256) -> U256 {
    per_minute(rate_per_second)
}

/// Seconds elapsed between the stream's start and `now` (zero if `now` is
/// before the start).
pub fn elapsed_seconds(stream: &Stream, now: u64) -> u64 {
    let start = u64::try_from(stream.start_time).unwrap_or(u64::MAX);
    now.saturating_sub(start)
}

/// Amount streamed to the creator as of `now`.
///
/// Active streams accrue `rate * elapsed`, capped at the deposit. Stopped
/// streams report their settled `totalPaid`.
pub fn streamed_amount(stream: &Stream, now: u64) -> U256 {
    if !stream.is_active {
        return stream.total_paid.unwrap_or(U256::ZERO);
    }
    cost_for(stream.rate_per_second, elapsed_seconds(stream, now)).min(stream.deposit)
}

/// Deposit not yet streamed as of `now`.
pub fn remaining_deposit(stream: &Stream, now: u64) -> U256 {
    if !stream.is_active {
        return stream.refunded.unwrap_or(U256::ZERO);
    }
    stream.deposit.saturating_sub(streamed_amount(stream, now))
}

/// Seconds until an active stream exhausts its deposit, `None` for a
/// stopped stream or a zero rate.
pub fn seconds_until_exhausted(stream: &Stream, now: u64) -> Option<u64> {
    if !stream.is_active || stream.rate_per_second.is_zero() {
        return None;
    }
    let remaining = remaining_deposit(stream, now);
    // Round up: a partial second still consumes the rest of the deposit.
    let secs = remaining.div_ceil(stream.rate_per_second);
    Some(u64::try_from(secs).unwrap_or(u64::MAX))
}

/// Render a fixed-point integer `amount` with `decimals` decimals, keeping
/// `precision` fractional digits (truncated). `format_units(1_500_000, 6, 4)`
/// is `"1.5000"`.
pub fn format_units(amount: U256, decimals: u8, precision: u8) -> String {
    // Past 77 decimals the scale exceeds every uint256, so the whole part is 0.
    let (whole, frac) = match U256::from(10u64).checked_pow(U256::from(decimals)) {
        Some(scale) => (amount / scale, amount % scale),
        None => (U256::ZERO, amount),
    };
    if precision == 0 {
        return whole.to_string();
    }
    let mut frac_str = format!("{:0>width$}", frac.to_string(), width = decimals as usize);
    frac_str.truncate(precision as usize);
    while frac_str.len() < precision as usize {
        frac_str.push('0');
    }
    format!("{whole}.{frac_str}")
}
