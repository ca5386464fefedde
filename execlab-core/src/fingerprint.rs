//! Run fingerprinting: deterministic identities for configurations and trade lists.
//!
//! Both hash the canonical JSON form with BLAKE3. Struct fields serialize in
//! declaration order and every map in the configuration is a `BTreeMap`, so
//! equal values always hash equal.

use serde::Serialize;

use crate::domain::Trade;

/// Hex BLAKE3 digest of `value`'s JSON form.
pub fn json_digest<T: Serialize + ?Sized>(value: &T) -> String {
    // Plain data into a Vec does not fail to serialize.
    let bytes = serde_json::to_vec(value).unwrap_or_default();
    blake3::hash(&bytes).to_hex().to_string()
}

pub fn trade_digest(trades: &[Trade]) -> String {
    json_digest(trades)
}

/// Short prefix used in file names and log lines.
pub fn short_id(digest: &str) -> &str {
    digest.get(..12).unwrap_or(digest)
}
