//! Kubernetes storage quantity parsing
//!
//! Storage sizes arrive as quantity strings ("1Gi", "500M", "1073741824").
//! Comparing them requires a common unit, so everything is normalized to a
//! byte count.

use crate::Error;

/// Binary and decimal suffixes, longest first so "Ki" wins over "k"
const SUFFIXES: [(&str, u128); 12] = [
    ("Ki", 1 << 10),
    ("Mi", 1 << 20),
    ("Gi", 1 << 30),
    ("Ti", 1 << 40),
    ("Pi", 1 << 50),
    ("Ei", 1 << 60),
    ("k", 1_000),
    ("M", 1_000_000),
    ("G", 1_000_000_000),
    ("T", 1_000_000_000_000),
    ("P", 1_000_000_000_000_000),
    ("E", 1_000_000_000_000_000_000),
];

/// Parse a storage quantity into bytes
///
/// Accepts a plain integer, an integer or decimal with a binary (Ki..Ei) or
/// decimal (k..E) suffix. Fractional byte counts round up.
pub fn parse_bytes(qty: &str) -> Result<u128, Error> {
    let qty = qty.trim();
    if qty.is_empty() {
        return Err(Error::validation("storage quantity is empty"));
    }

    let (number, multiplier) = SUFFIXES
        .iter()
        .find(|(suffix, _)| qty.ends_with(suffix))
        .map(|(suffix, mult)| (&qty[..qty.len() - suffix.len()], *mult))
        .unwrap_or((qty, 1));

    if let Ok(whole) = number.parse::<u128>() {
        return whole
            .checked_mul(multiplier)
            .ok_or_else(|| invalid(qty, "value overflows"));
    }

    let value: f64 = number
        .parse()
        .map_err(|_| invalid(qty, "expected e.g. '1Gi', '500M' or a byte count"))?;
    if !value.is_finite() || value < 0.0 {
        return Err(invalid(qty, "must be a non-negative number"));
    }

    Ok((value * multiplier as f64).ceil() as u128)
}

fn invalid(qty: &str, reason: &str) -> Error {
    Error::validation(format!("invalid storage quantity '{}': {}", qty, reason))
}
