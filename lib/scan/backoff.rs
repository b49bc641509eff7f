use std::time::Duration;

use super::types::BackoffPolicy;

/// Computes the sleep after a rate-pressure response.
///
/// The base delay doubles per consecutive pressure event in this run, capped
/// by `max`, with bounded jitter hashed from the offending identifier so no
/// extra randomness dependency is needed.
pub fn compute_backoff_delay(
    policy: &BackoffPolicy,
    pressure_events: u32,
    violation_number: u64,
) -> Duration {
    if policy.base.is_zero() && policy.jitter.is_zero() {
        return Duration::ZERO;
    }

    let shift = u32::min(pressure_events.saturating_sub(1), 20);
    let exponential_ms = policy.base.as_millis().saturating_mul(1u128 << shift);
    let capped_ms = exponential_ms.min(policy.max.as_millis());

    let jitter_ms = if policy.jitter.is_zero() {
        0
    } else {
        bounded_jitter(violation_number, pressure_events, policy.jitter.as_millis())
    };

    let total_ms = capped_ms.saturating_add(jitter_ms);
    Duration::from_millis(total_ms.min(u64::MAX as u128) as u64)
}

fn bounded_jitter(violation_number: u64, pressure_events: u32, jitter_cap: u128) -> u128 {
    if jitter_cap == 0 {
        return 0;
    }

    let mut x = violation_number ^ (pressure_events as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    x ^= x >> 33;
    x = x.wrapping_mul(0xff51_afd7_ed55_8ccd);
    x ^= x >> 33;
    x = x.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    x ^= x >> 33;

    (x as u128) % (jitter_cap + 1)
}
