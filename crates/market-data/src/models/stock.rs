use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::code::{normalize_code, Board, Exchange};
use super::types::StockCode;

/// One roster entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StockInfo {
    /// Normalized 6-digit code
    pub code: StockCode,

    /// Display name
    pub name: String,

    pub exchange: Exchange,

    pub board: Board,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_date: Option<NaiveDate>,
}

impl StockInfo {
    /// Build a roster entry from a raw provider code.
    ///
    /// Returns `None` when the code has no digits.
    pub fn from_raw(raw_code: &str, name: impl Into<String>) -> Option<Self> {
        let code = normalize_code(raw_code)?;
        Some(Self {
            exchange: Exchange::from_code(&code),
            board: Board::from_code(&code),
            code,
            name: name.into(),
            industry: None,
            area: None,
            list_date: None,
        })
    }

    /// Full symbol such as `000001.SZ`.
    pub fn full_symbol(&self) -> String {
        self.exchange.full_symbol(&self.code)
    }
}
