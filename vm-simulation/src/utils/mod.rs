//! Utility modules

pub mod amm_math;
pub mod fixed_point;
pub mod hash;

pub use hash::{fingerprint, hash_to_hex};
