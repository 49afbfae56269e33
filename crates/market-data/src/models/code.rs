//! Instrument code normalization.
//!
//! Providers spell the same instrument differently: `sz000001`, `SZ000001`,
//! `000001.SZ`, `1`. Everything is normalized to the bare 6-digit form before
//! it is used as an entity key.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Width of a normalized instrument code.
const CODE_WIDTH: usize = 6;

/// Normalize a raw provider code to the 6-digit form.
///
/// Strips every non-digit character (exchange prefixes and suffixes), drops
/// leading zeros and left-pads back to six digits. Returns `None` when the
/// input contains no digits at all, so such rows are dropped rather than
/// defaulted.
///
/// ```
/// use marketsync_market_data::normalize_code;
///
/// assert_eq!(normalize_code("sz000001").as_deref(), Some("000001"));
/// assert_eq!(normalize_code("600519.SH").as_deref(), Some("600519"));
/// assert_eq!(normalize_code("1").as_deref(), Some("000001"));
/// assert_eq!(normalize_code("N/A"), None);
/// ```
pub fn normalize_code(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let trimmed = digits.trim_start_matches('0');
    let significant = if trimmed.is_empty() { "0" } else { trimmed };
    Some(format!("{:0>width$}", significant, width = CODE_WIDTH))
}

/// Listing exchange, inferred from the code prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Exchange {
    Shanghai,
    Shenzhen,
    Beijing,
}

impl Exchange {
    /// Infer the exchange from a normalized code. Unknown prefixes map to Shenzhen.
    pub fn from_code(code: &str) -> Self {
        if code.starts_with("60") || code.starts_with("68") || code.starts_with("90") {
            Self::Shanghai
        } else if code.starts_with('8') || code.starts_with('4') {
            Self::Beijing
        } else {
            Self::Shenzhen
        }
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Shanghai => "SH",
            Self::Shenzhen => "SZ",
            Self::Beijing => "BJ",
        }
    }

    /// Full symbol such as `600519.SH`.
    pub fn full_symbol(&self, code: &str) -> String {
        format!("{}.{}", code, self.suffix())
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Market board, inferred from the code prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Board {
    Main,
    Sme,
    ChiNext,
    Star,
    Bse,
    Neeq,
    Unknown,
}

impl Board {
    pub fn from_code(code: &str) -> Self {
        if code.starts_with("000") || code.starts_with("60") {
            Self::Main
        } else if code.starts_with("002") {
            Self::Sme
        } else if code.starts_with("300") {
            Self::ChiNext
        } else if code.starts_with("688") {
            Self::Star
        } else if code.starts_with('8') {
            Self::Bse
        } else if code.starts_with('4') {
            Self::Neeq
        } else {
            Self::Unknown
        }
    }
}
