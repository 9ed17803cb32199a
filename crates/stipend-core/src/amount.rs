//! Token amount conversions.
//!
//! On-ledger amounts are u64 integers in the token's smallest unit; the
//! display unit carries nine decimal places. Conversions are exact for
//! any amount representable in an f64 mantissa; a display value that
//! lands between smallest units rounds to the nearest unit.

/// Decimal places between the smallest unit and the display unit.
pub const TOKEN_DECIMALS: u32 = 9;

const UNITS_PER_DISPLAY: f64 = 1_000_000_000.0;

/// Convert a display-unit value to smallest units.
///
/// Fractional smallest-unit inputs round to the nearest unit (ties away
/// from zero, per `f64::round`). Negative inputs clamp to zero.
pub fn to_smallest(display: f64) -> u64 {
    if !display.is_finite() || display <= 0.0 {
        return 0;
    }
    (display * UNITS_PER_DISPLAY).round() as u64
}

/// Convert smallest units to the display unit.
pub fn from_smallest(amount: u64) -> f64 {
    amount as f64 / UNITS_PER_DISPLAY
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn whole_unit_conversions() {
        assert_eq!(to_smallest(1.0), 1_000_000_000);
        assert_eq!(to_smallest(2.5), 2_500_000_000);
        assert_eq!(from_smallest(1_000_000_000), 1.0);
    }

    #[test]
    fn fractional_smallest_units_round() {
        // Half a smallest unit rounds up.
        assert_eq!(to_smallest(0.000_000_000_5), 1);
        assert_eq!(to_smallest(0.000_000_000_4), 0);
    }

    #[test]
    fn negative_and_non_finite_clamp_to_zero() {
        assert_eq!(to_smallest(-3.0), 0);
        assert_eq!(to_smallest(f64::NAN), 0);
        assert_eq!(to_smallest(f64::INFINITY), 0);
    }

    proptest! {
        // Round-trip holds for any amount comfortably inside the f64
        // mantissa (two roundings cost up to a quarter unit at 2^50).
        #[test]
        fn roundtrip_exact(amount in 0u64..(1 << 50)) {
            prop_assert_eq!(to_smallest(from_smallest(amount)), amount);
        }
    }
}
