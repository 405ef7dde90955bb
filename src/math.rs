//! Reserve arithmetic.
//!
//! Every price intermediate is an arbitrary-precision [`Decimal`]; binary
//! floats would compound rounding error across chained conversions, so they
//! never appear on this path.

use crate::errors::MathError;
use ethers::types::{Address, U256};
use ethers::utils::format_units;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Scales a raw integer amount by the token's decimal count.
pub fn to_decimal(raw: U256, decimals: u8) -> Result<Decimal, MathError> {
    let text = format_units(raw, u32::from(decimals))
        .map_err(|e| MathError::Overflow(e.to_string()))?;
    Decimal::from_str(&text).map_err(|e| MathError::Overflow(e.to_string()))
}

/// Converts two raw reserves into both directional price ratios:
/// `(price of A in B, price of B in A)`.
pub fn ratios(
    reserve_a: U256,
    reserve_b: U256,
    decimals_a: u8,
    decimals_b: u8,
) -> Result<(Decimal, Decimal), MathError> {
    let a = to_decimal(reserve_a, decimals_a)?;
    let b = to_decimal(reserve_b, decimals_b)?;
    if a.is_zero() || b.is_zero() {
        return Err(MathError::ZeroReserve);
    }
    Ok((b / a, a / b))
}

/// Re-derives the pool's token slot order: reserves are exposed in the slot
/// order fixed at pool creation by byte-wise address sort. Returns the slot
/// indices of `a` and `b`; always complementary `{0, 1}`.
pub fn token_positions(a: Address, b: Address) -> (usize, usize) {
    if a < b {
        (0, 1)
    } else {
        (1, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn units(n: u64, decimals: u32) -> U256 {
        U256::from(n) * U256::exp10(decimals as usize)
    }

    #[test]
    fn to_decimal_scales_by_decimals() {
        assert_eq!(to_decimal(units(1000, 18), 18).unwrap(), dec!(1000));
        assert_eq!(to_decimal(U256::from(1_500_000u64), 6).unwrap(), dec!(1.5));
        assert_eq!(to_decimal(U256::zero(), 18).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn ratios_are_multiplicative_inverses() {
        let (ab, ba) = ratios(units(1000, 18), units(500, 6), 18, 6).unwrap();
        assert_eq!(ab, dec!(0.5));
        let product = ab * ba;
        assert!((product - Decimal::ONE).abs() < dec!(0.000000000000000001));
    }

    #[test]
    fn ratios_reject_zero_reserves() {
        assert_eq!(
            ratios(U256::zero(), units(500, 18), 18, 18).unwrap_err(),
            MathError::ZeroReserve
        );
        assert_eq!(
            ratios(units(500, 18), U256::zero(), 18, 18).unwrap_err(),
            MathError::ZeroReserve
        );
    }

    #[test]
    fn token_positions_are_complementary() {
        let a = Address::from_low_u64_be(1);
        let b = Address::from_low_u64_be(2);
        assert_eq!(token_positions(a, b), (0, 1));
        assert_eq!(token_positions(b, a), (1, 0));

        let (pa, pb) = token_positions(a, b);
        let (qb, qa) = token_positions(b, a);
        assert_eq!(pa, qa);
        assert_eq!(pb, qb);
    }
}
