//! Intraday quote snapshot rows.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::types::StockCode;

/// Latest quote for one instrument.
///
/// Prices in CNY, volume in shares, amount in CNY. Absent values were not
/// reported; a suspended instrument has no `price`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeQuote {
    pub code: StockCode,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub price: Option<Decimal>,
    pub pre_close: Option<Decimal>,
    pub open: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,

    /// Percent change against `pre_close`
    pub change_pct: Option<Decimal>,

    pub volume: Option<Decimal>,
    pub amount: Option<Decimal>,
}

impl RealtimeQuote {
    pub fn new(code: impl Into<StockCode>) -> Self {
        Self {
            code: code.into(),
            ..Self::default()
        }
    }

    /// `change_pct` as reported, else derived from `price` and `pre_close`.
    pub fn fill_change_pct(&mut self) {
        if self.change_pct.is_some() {
            return;
        }
        let (Some(price), Some(pre_close)) = (self.price, self.pre_close) else {
            return;
        };
        if pre_close.is_zero() {
            return;
        }
        self.change_pct = (price - pre_close)
            .checked_div(pre_close)
            .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
            .map(|pct| pct.round_dp(4));
    }
}
