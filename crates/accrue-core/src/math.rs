//! Fixed-point helpers.
//!
//! Values and coefficients are unsigned 128-bit integers scaled by
//! [`PRECISION`]. Products of two scaled quantities can exceed 128 bits
//! before the rescaling division, so [`mul_div`] carries the full 256-bit
//! intermediate and only fails when the *quotient* does not fit.
//! Division always truncates toward zero.

use crate::constants::PRECISION;

const LOW_MASK: u128 = u64::MAX as u128;

/// Full 256-bit product of two u128 values as `(high, low)` words.
fn widening_mul(a: u128, b: u128) -> (u128, u128) {
    let (a_hi, a_lo) = (a >> 64, a & LOW_MASK);
    let (b_hi, b_lo) = (b >> 64, b & LOW_MASK);

    let lo_lo = a_lo * b_lo;
    let lo_hi = a_lo * b_hi;
    let hi_lo = a_hi * b_lo;
    let hi_hi = a_hi * b_hi;

    // At most 3 * (2^64 - 1): cannot overflow.
    let middle = (lo_lo >> 64) + (lo_hi & LOW_MASK) + (hi_lo & LOW_MASK);

    let low = (lo_lo & LOW_MASK) | (middle << 64);
    let high = hi_hi + (lo_hi >> 64) + (hi_lo >> 64) + (middle >> 64);
    (high, low)
}

/// Computes `a * b / denominator`, truncating.
///
/// Returns `None` if `denominator` is zero or the quotient exceeds `u128::MAX`.
pub fn mul_div(a: u128, b: u128, denominator: u128) -> Option<u128> {
    if denominator == 0 {
        return None;
    }
    let (high, low) = widening_mul(a, b);
    if high == 0 {
        return Some(low / denominator);
    }
    if high >= denominator {
        return None;
    }

    // Restoring long division of the low word, seeded with the high word as
    // the running remainder (already < denominator).
    let mut remainder = high;
    let mut quotient: u128 = 0;
    for bit in (0..128).rev() {
        let carry = remainder >> 127;
        remainder = (remainder << 1) | ((low >> bit) & 1);
        quotient <<= 1;
        if carry == 1 || remainder >= denominator {
            remainder = remainder.wrapping_sub(denominator);
            quotient |= 1;
        }
    }
    Some(quotient)
}

/// Multiplies a fixed-point quantity by a fixed-point rate: `value * rate / PRECISION`.
pub fn apply_rate(value: u128, rate: u128) -> Option<u128> {
    mul_div(value, rate, PRECISION)
}

/// Dollar-time of `value` held from time zero until `at`: `value * at` as i128.
pub fn dollar_time(value: u128, at: u64) -> Option<i128> {
    i128::try_from(value).ok()?.checked_mul(i128::from(at))
}

/// Non-negative i128 weight as u128; negative weights clamp to zero.
pub fn non_negative(weight: i128) -> u128 {
    u128::try_from(weight).unwrap_or(0)
}
