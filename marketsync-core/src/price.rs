//! Currency-less prices held in minor units.
//!
//! Marketplaces report prices as decimal strings (`"12.50"`), JSON numbers
//! (`12.5`) or integer cents (Kaufland). [`Price`] keeps everything as
//! integer cents so arithmetic never goes through floating point.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A price in minor units (cents). Single currency is assumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(i64);

impl Price {
    pub const ZERO: Price = Price(0);

    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Parse a major-unit decimal such as `"12.5"`, `"12.50"` or `"12"`.
    ///
    /// Digits beyond the second decimal place are rounded half-up.
    /// Returns `None` for anything that is not a plain decimal or does not
    /// fit in `i64` cents.
    pub fn parse_major(input: &str) -> Option<Self> {
        let input = input.trim();
        let (negative, digits) = match input.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, input),
        };

        let (whole, frac) = match digits.split_once('.') {
            Some((w, f)) => (w, f),
            None => (digits, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return None;
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }

        let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
        let mut frac_digits = frac.bytes().map(|b| i64::from(b - b'0'));
        let tenths = frac_digits.next().unwrap_or(0);
        let hundredths = frac_digits.next().unwrap_or(0);
        let round_up = frac_digits.next().map(|d| d >= 5).unwrap_or(false);

        let cents = whole
            .checked_mul(100)?
            .checked_add(tenths * 10 + hundredths)?
            .checked_add(i64::from(round_up))?;
        Some(Self(if negative { -cents } else { cents }))
    }

    /// Interpret a JSON value (string or number) as a major-unit price.
    pub fn from_json_major(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Self::parse_major(s),
            serde_json::Value::Number(n) => Self::parse_major(&n.to_string()),
            _ => None,
        }
    }

    /// Interpret a JSON value (string or number) as integer minor units.
    pub fn from_json_cents(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.round() as i64))
                .map(Self),
            serde_json::Value::String(s) => Self::parse_major(s).map(|p| Self(p.0 / 100)),
            _ => None,
        }
    }

    /// The price as a JSON number in major units, for APIs that want one.
    pub fn to_json_major(&self) -> serde_json::Value {
        serde_json::Number::from_f64(self.0 as f64 / 100.0)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

impl fmt::Display for Price {
    /// Formats as a major-unit decimal with two places, e.g. `12.50`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}
