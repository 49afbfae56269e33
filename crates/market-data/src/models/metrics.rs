//! Daily valuation metrics.

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::types::StockCode;

/// Numeric fields a provider may report for one instrument and day.
///
/// Units are canonical across providers: market caps in 100M CNY, share
/// counts in 10k shares, turnover rate in percent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricField {
    Close,
    Pe,
    PeTtm,
    Pb,
    Ps,
    PsTtm,
    TotalMv,
    CircMv,
    TurnoverRate,
    VolumeRatio,
    TotalShare,
    FloatShare,
}

impl MetricField {
    /// Every field, in comparison order.
    pub const ALL: [MetricField; 12] = [
        Self::Close,
        Self::Pe,
        Self::PeTtm,
        Self::Pb,
        Self::Ps,
        Self::PsTtm,
        Self::TotalMv,
        Self::CircMv,
        Self::TurnoverRate,
        Self::VolumeRatio,
        Self::TotalShare,
        Self::FloatShare,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Close => "close",
            Self::Pe => "pe",
            Self::PeTtm => "pe_ttm",
            Self::Pb => "pb",
            Self::Ps => "ps",
            Self::PsTtm => "ps_ttm",
            Self::TotalMv => "total_mv",
            Self::CircMv => "circ_mv",
            Self::TurnoverRate => "turnover_rate",
            Self::VolumeRatio => "volume_ratio",
            Self::TotalShare => "total_share",
            Self::FloatShare => "float_share",
        }
    }

    /// Parse a field name as used in config files and upstream column lists.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == name)
    }
}

impl fmt::Display for MetricField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metrics for one instrument on one day.
///
/// A field missing from `values` was not reported; it is never stored as zero.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub code: StockCode,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub values: BTreeMap<MetricField, Decimal>,
}

impl MetricRecord {
    pub fn new(code: impl Into<StockCode>) -> Self {
        Self {
            code: code.into(),
            name: None,
            values: BTreeMap::new(),
        }
    }

    pub fn get(&self, field: MetricField) -> Option<Decimal> {
        self.values.get(&field).copied()
    }

    /// Set a field; `None` leaves the field absent.
    pub fn set(&mut self, field: MetricField, value: Option<Decimal>) {
        if let Some(value) = value {
            self.values.insert(field, value);
        }
    }

    pub fn with(mut self, field: MetricField, value: Decimal) -> Self {
        self.values.insert(field, value);
        self
    }

    /// Number of fields with a value.
    pub fn populated_count(&self) -> usize {
        self.values.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_field_names_round_trip() {
        for field in MetricField::ALL {
            assert_eq!(MetricField::from_name(field.as_str()), Some(field));
        }
        assert_eq!(MetricField::from_name("dividend_yield"), None);
    }

    #[test]
    fn test_serde_name_matches_as_str() {
        let json = serde_json::to_string(&MetricField::TurnoverRate).unwrap();
        assert_eq!(json, "\"turnover_rate\"");
    }

    #[test]
    fn test_absent_is_not_zero() {
        let mut record = MetricRecord::new("000001");
        record.set(MetricField::Pe, None);
        record.set(MetricField::Pb, Some(dec!(0)));

        assert_eq!(record.get(MetricField::Pe), None);
        assert_eq!(record.get(MetricField::Pb), Some(dec!(0)));
        assert_eq!(record.populated_count(), 1);
    }
}
