//! Upstream value conversion shared by the adapters.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::Value;

/// 10k CNY per 100M CNY.
pub(crate) const WAN_PER_YI: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

/// CNY per 100M CNY.
pub(crate) const YUAN_PER_YI: Decimal = Decimal::from_parts(100_000_000, 0, 0, false, 0);

/// Shares per 10k shares.
pub(crate) const SHARES_PER_WAN: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

/// Shares per board lot (手).
pub(crate) const SHARES_PER_LOT: Decimal = Decimal::from_parts(100, 0, 0, false, 0);

/// Parse a JSON cell as a decimal.
///
/// Numbers keep their literal digits. Numeric strings are accepted; `null`,
/// `"-"`, empty strings and non-finite values are absent.
pub(crate) fn parse_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => parse_decimal_str(&n.to_string()),
        Value::String(s) => parse_decimal_str(s),
        _ => None,
    }
}

fn parse_decimal_str(raw: &str) -> Option<Decimal> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "-" {
        return None;
    }
    raw.parse::<Decimal>()
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}

/// Parse a JSON cell and divide it by `divisor`.
pub(crate) fn parse_scaled(value: &Value, divisor: Decimal) -> Option<Decimal> {
    parse_decimal(value).and_then(|v| v.checked_div(divisor))
}

/// Parse a JSON cell as trimmed, non-empty text.
pub(crate) fn parse_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty() && s != "-").then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse a compact `YYYYMMDD` date.
pub(crate) fn parse_compact_date(value: &Value) -> Option<NaiveDate> {
    parse_text(value).and_then(|s| NaiveDate::parse_from_str(&s, "%Y%m%d").ok())
}

/// Format a date as `YYYYMMDD`.
pub(crate) fn compact_date(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_parse_decimal_keeps_literal_digits() {
        assert_eq!(parse_decimal(&json!(10.05)), Some(dec!(10.05)));
        assert_eq!(parse_decimal(&json!("12.5")), Some(dec!(12.5)));
        assert_eq!(parse_decimal(&json!(3)), Some(dec!(3)));
    }

    #[test]
    fn test_parse_decimal_absent_markers() {
        assert_eq!(parse_decimal(&json!("-")), None);
        assert_eq!(parse_decimal(&json!("")), None);
        assert_eq!(parse_decimal(&Value::Null), None);
        assert_eq!(parse_decimal(&json!("n/a")), None);
    }

    #[test]
    fn test_parse_scaled() {
        assert_eq!(parse_scaled(&json!(25_000_000), WAN_PER_YI), Some(dec!(2500)));
        assert_eq!(
            parse_scaled(&json!(250_000_000_000i64), YUAN_PER_YI),
            Some(dec!(2500))
        );
    }

    #[test]
    fn test_compact_dates() {
        let date = NaiveDate::from_ymd_opt(1991, 4, 3).unwrap();
        assert_eq!(parse_compact_date(&json!("19910403")), Some(date));
        assert_eq!(compact_date(date), "19910403");
        assert_eq!(parse_compact_date(&json!("1991-04-03")), None);
    }
}
