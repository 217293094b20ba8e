//! Large-number suffix notation codec.
//!
//! # Responsibility
//! - Decode human-entered quantities such as `1.5A`, `2B`, `3C'`.
//! - Encode balances and quantities for display (`1.50A`, `1.00B`).
//!
//! # Invariants
//! - `A` is `1000^1`, `Z` is `1000^26`; every apostrophe adds 26 to the
//!   exponent, so `A'` is `1000^27`.
//! - Decode never returns a partial value: malformed or non-finite input is
//!   always `NotationError::InvalidNotation`.
//! - Encode is lossy (two decimals); only plain integral input decodes exactly.

use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};

const UNIT_LETTERS: &[u8; 26] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const UNIT_BASE: f64 = 1000.0;

static PLAIN_DECIMAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?\d+(?:\.\d+)?$").expect("valid plain decimal regex"));
static SUFFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+(?:\.\d+)?)\s*([A-Z])('*)$").expect("valid suffix notation regex")
});

pub type NotationResult<T> = Result<T, NotationError>;

/// Errors from notation decode/encode.
#[derive(Debug, Clone, PartialEq)]
pub enum NotationError {
    /// Input text matches neither a plain decimal nor the suffix pattern.
    InvalidNotation(String),
    /// Value cannot be represented (NaN or infinite).
    NonFinite(f64),
}

impl Display for NotationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidNotation(text) => write!(f, "invalid notation: `{text}`"),
            Self::NonFinite(value) => write!(f, "value is not finite: {value}"),
        }
    }
}

impl Error for NotationError {}

/// Decodes a plain decimal or suffix-notation string into a magnitude.
pub fn decode(text: &str) -> NotationResult<f64> {
    let normalized = text.trim().to_ascii_uppercase();

    if PLAIN_DECIMAL_RE.is_match(&normalized) {
        return normalized
            .parse::<f64>()
            .map_err(|_| NotationError::InvalidNotation(text.to_string()));
    }

    let caps = SUFFIX_RE
        .captures(&normalized)
        .ok_or_else(|| NotationError::InvalidNotation(text.to_string()))?;

    let numeric: f64 = caps[1]
        .parse()
        .map_err(|_| NotationError::InvalidNotation(text.to_string()))?;
    let letter = caps[2].as_bytes()[0];
    let tier = caps[3].len();
    let exponent = suffix_exponent(letter, tier)
        .ok_or_else(|| NotationError::InvalidNotation(text.to_string()))?;

    let value = numeric * UNIT_BASE.powi(exponent);
    if !value.is_finite() {
        return Err(NotationError::InvalidNotation(text.to_string()));
    }
    Ok(value)
}

/// Encodes a magnitude for display.
///
/// Values below 1000 are floored to an integer without suffix; larger values
/// are scaled by powers of 1000 and rendered with two decimals.
pub fn encode(value: f64) -> NotationResult<String> {
    if !value.is_finite() {
        return Err(NotationError::NonFinite(value));
    }
    Ok(encode_finite(value))
}

/// Display string for an integer balance.
pub fn format_balance(balance: i64) -> String {
    encode_finite(balance as f64)
}

fn encode_finite(value: f64) -> String {
    if value < UNIT_BASE {
        return (value.floor() as i64).to_string();
    }

    let mut scaled = value;
    let mut power = 0usize;
    while scaled >= UNIT_BASE {
        scaled /= UNIT_BASE;
        power += 1;
    }

    let unit = UNIT_LETTERS[(power - 1) % UNIT_LETTERS.len()] as char;
    let apostrophes = "'".repeat((power - 1) / UNIT_LETTERS.len());
    format!("{scaled:.2}{unit}{apostrophes}")
}

fn suffix_exponent(letter: u8, tier: usize) -> Option<i32> {
    let base = usize::from(letter.checked_sub(b'A')?);
    let exponent = tier
        .checked_mul(UNIT_LETTERS.len())?
        .checked_add(base + 1)?;
    i32::try_from(exponent).ok()
}
