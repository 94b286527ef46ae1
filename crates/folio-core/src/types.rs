//! Custom types for common data structures

use chrono::{DateTime as ChronoDateTime, Utc};

/// Database DateTime type used across all Folio crates
///
/// This is the canonical datetime type for database TIMESTAMPTZ columns.
///
/// # Example
/// ```rust
/// use folio_core::DBDateTime;
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// pub struct Response {
///     pub created_at: DBDateTime,
/// }
/// ```
pub type DBDateTime = ChronoDateTime<Utc>;

/// Standard UTC DateTime type used across all Folio crates
///
/// Serializes as ISO 8601 with a UTC offset (`2025-10-12T12:15:47.609192Z`).
pub type UtcDateTime = ChronoDateTime<Utc>;

/// Rounds a timestamp down to whole seconds.
///
/// Timestamps are stored as text on SQLite, where sub-second precision makes
/// range filters compare inconsistently between writers.
pub fn truncate_to_seconds(dt: UtcDateTime) -> UtcDateTime {
    ChronoDateTime::<Utc>::from_timestamp(dt.timestamp(), 0).unwrap_or(dt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn test_truncate_to_seconds() {
        let dt = Utc
            .with_ymd_and_hms(2024, 1, 15, 14, 30, 5)
            .unwrap()
            .with_nanosecond(750_000_000)
            .unwrap();
        let truncated = truncate_to_seconds(dt);
        assert_eq!(truncated.nanosecond(), 0);
        assert_eq!(truncated.second(), 5);
    }
}
