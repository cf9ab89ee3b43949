//! Fixed-Point Helpers
//!
//! Token amounts are integers scaled by 10^18. Cumulative prices use a
//! binary fixed-point (Q112) encoding so that `reserve_out / reserve_in` can
//! be integrated over time without losing the fractional part.

use primitive_types::U256;

/// Number of decimals used for every token amount
pub const DECIMALS: usize = 18;

/// Fractional bits of the Q-format used by the price accumulators
pub const Q_RESOLUTION: usize = 112;

/// 10^18
pub fn wad() -> U256 {
    U256::exp10(DECIMALS)
}

/// Scale a whole token amount to 18 decimals
pub fn expand_to_18_decimals(tokens: u64) -> U256 {
    U256::from(tokens) * wad()
}

/// Scale a fractional token amount to 18 decimals.
///
/// Keeps 9 decimals of the float; the remaining digits are zero.
pub fn expand_f64_to_18_decimals(tokens: f64) -> U256 {
    if !tokens.is_finite() || tokens <= 0.0 {
        return U256::zero();
    }
    let nano = (tokens * 1e9).round();
    if nano >= u128::MAX as f64 {
        return U256::max_value();
    }
    U256::from(nano as u128) * U256::exp10(DECIMALS - 9)
}

/// Convert an 18-decimal amount back to a float (for charts and summaries only)
pub fn contract_18_decimals_to_f64(amount: U256) -> f64 {
    let (whole, fraction) = amount.div_mod(wad());
    u256_to_f64(whole) + fraction.low_u64() as f64 / 1e18
}

/// Lossy conversion of a U256 to f64
pub fn u256_to_f64(value: U256) -> f64 {
    value
        .0
        .iter()
        .rev()
        .fold(0.0, |acc, limb| acc * 18_446_744_073_709_551_616.0 + *limb as f64)
}

/// Encode an integer as Q112
pub fn q_encode(x: U256) -> U256 {
    x << Q_RESOLUTION
}

/// Decode a Q112 value, truncating the fraction
pub fn q_decode(x: U256) -> U256 {
    x >> Q_RESOLUTION
}

/// Integer square root (Babylonian method), floor of the real root
pub fn sqrt(y: u64) -> u64 {
    if y > 3 {
        let mut z = y;
        let mut x = y / 2 + 1;
        while x < z {
            z = x;
            x = (y / x + x) / 2;
        }
        z
    } else if y != 0 {
        1
    } else {
        0
    }
}

/// Serde adapter writing U256 as a decimal string
pub mod u256_dec {
    use primitive_types::U256;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let s = String::deserialize(deserializer)?;
        U256::from_dec_str(s.trim()).map_err(|e| D::Error::custom(format!("invalid amount {s:?}: {e:?}")))
    }
}

/// Serde adapter for `Option<U256>` as an optional decimal string
pub mod u256_dec_opt {
    use primitive_types::U256;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<U256>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.collect_str(v),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<U256>, D::Error> {
        let s: Option<String> = Option::deserialize(deserializer)?;
        s.map(|s| {
            U256::from_dec_str(s.trim()).map_err(|e| D::Error::custom(format!("invalid amount {s:?}: {e:?}")))
        })
        .transpose()
    }
}
