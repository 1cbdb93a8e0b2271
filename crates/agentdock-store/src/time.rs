//! UTC timestamp helpers. Spec.md §3 requires second-precision UTC ISO-8601
//! timestamps; `chrono`'s RFC 3339 formatting with `SecondsFormat::Secs`
//! gives exactly that.

use chrono::{DateTime, SecondsFormat, Utc};

/// Render `dt` as a second-precision UTC ISO-8601 string for storage.
#[must_use]
pub fn to_storage_string(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse a stored timestamp string back into a `DateTime<Utc>`.
pub fn from_storage_string(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

/// The current time, truncated to second precision, for consistent
/// round-tripping through storage.
#[must_use]
pub fn now() -> DateTime<Utc> {
    let now = Utc::now();
    from_storage_string(&to_storage_string(now)).unwrap_or(now)
}
