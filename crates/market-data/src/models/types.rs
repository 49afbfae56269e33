use std::borrow::Cow;

/// Provider identifier - mostly static constants
pub type ProviderId = Cow<'static, str>;

/// Normalized 6-digit instrument code (e.g. "000001")
pub type StockCode = String;
