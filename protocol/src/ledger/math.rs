//! Widened multiply-then-divide with an explicit rounding direction.
//!
//! `a * b / d` in `u64` overflows long before the answer does, so the
//! product is taken in `u128`. The quotient must fit back into `u64`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Direction to round a quotient that isn't exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rounding {
    /// Toward zero. The floor, for unsigned values.
    Down,
    /// Away from zero. The ceiling, for unsigned values.
    Up,
}

/// Arithmetic failures in conversion math.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MathError {
    /// The result does not fit in `u64`.
    #[error("arithmetic overflow")]
    Overflow,

    /// The denominator was zero. For exchange-rate math this means shares
    /// are outstanding against zero managed assets.
    #[error("division by zero")]
    DivisionByZero,
}

/// Computes `a * b / denominator`, rounded in the requested direction.
///
/// # Errors
///
/// Returns [`MathError::DivisionByZero`] if `denominator` is zero and
/// [`MathError::Overflow`] if the rounded quotient exceeds `u64::MAX`.
pub fn mul_div(a: u64, b: u64, denominator: u64, rounding: Rounding) -> Result<u64, MathError> {
    if denominator == 0 {
        return Err(MathError::DivisionByZero);
    }

    // u64 * u64 always fits in u128.
    let product = u128::from(a) * u128::from(b);
    let denominator = u128::from(denominator);

    let mut quotient = product / denominator;
    if rounding == Rounding::Up && product % denominator != 0 {
        quotient += 1;
    }

    u64::try_from(quotient).map_err(|_| MathError::Overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_division_ignores_rounding() {
        assert_eq!(mul_div(500, 1000, 2000, Rounding::Down), Ok(250));
        assert_eq!(mul_div(500, 1000, 2000, Rounding::Up), Ok(250));
    }

    #[test]
    fn inexact_division_rounds_as_asked() {
        // 100 * 333 / 1000 = 33.3
        assert_eq!(mul_div(100, 333, 1000, Rounding::Down), Ok(33));
        assert_eq!(mul_div(100, 333, 1000, Rounding::Up), Ok(34));
    }

    #[test]
    fn tiny_quotient_floors_to_zero_but_ceils_to_one() {
        assert_eq!(mul_div(1, 1, 1_000_000, Rounding::Down), Ok(0));
        assert_eq!(mul_div(1, 1, 1_000_000, Rounding::Up), Ok(1));
    }

    #[test]
    fn wide_intermediate_does_not_overflow() {
        // u64::MAX * u64::MAX / u64::MAX fits once divided.
        assert_eq!(
            mul_div(u64::MAX, u64::MAX, u64::MAX, Rounding::Down),
            Ok(u64::MAX)
        );
    }

    #[test]
    fn oversized_quotient_is_an_error() {
        assert_eq!(
            mul_div(u64::MAX, 2, 1, Rounding::Down),
            Err(MathError::Overflow)
        );
    }

    #[test]
    fn zero_denominator_is_an_error() {
        assert_eq!(
            mul_div(1, 1, 0, Rounding::Up),
            Err(MathError::DivisionByZero)
        );
    }
}
