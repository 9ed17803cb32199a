//! Proptest strategies for stipend types.

use proptest::prelude::*;
use stipend_core::Address;

/// Token amounts that fit comfortably in an f64 mantissa.
pub fn amounts() -> impl Strategy<Value = u64> {
    0u64..(1 << 50)
}

/// Valid period-type text.
pub fn valid_period_types() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("daily".to_string()),
        Just("weekly".to_string()),
        Just("monthly".to_string()),
    ]
}

/// Arbitrary period-type text, mostly invalid.
pub fn any_period_types() -> impl Strategy<Value = String> {
    prop_oneof![
        2 => valid_period_types(),
        3 => "[a-z]{0,12}",
    ]
}

/// Random ledger addresses.
pub fn addresses() -> impl Strategy<Value = Address> {
    any::<[u8; 32]>().prop_map(Address::from_bytes)
}

/// Timestamps within a plausible range.
pub fn timestamps() -> impl Strategy<Value = i64> {
    0i64..4_102_444_800_000 // through 2100
}
