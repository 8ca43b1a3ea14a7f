//! Timestamp helpers.
//!
//! All persisted and wire timestamps are ISO-8601 UTC with microsecond
//! precision and an explicit `Z` suffix. The format sorts lexicographically,
//! which the store relies on for range scans over TEXT columns.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::errors::EngineError;

/// Current UTC time in the canonical storage format.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Format an instant in the canonical storage format.
pub fn to_iso(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Current UTC time shifted by a number of hours (may be negative).
pub fn hours_from_now(hours: f64) -> String {
    let delta = chrono::Duration::microseconds((hours * 3_600_000_000.0) as i64);
    to_iso(Utc::now() + delta)
}

/// Parse a timestamp that must carry explicit timezone information.
///
/// Accepts RFC 3339 with `Z` or a `±HH:MM` offset; naive timestamps are
/// rejected per the wire contract. The result is normalised to UTC.
pub fn parse_required_tz(value: &str, field: &str) -> Result<String, EngineError> {
    match DateTime::parse_from_rfc3339(value) {
        Ok(dt) => Ok(to_iso(dt.with_timezone(&Utc))),
        Err(_) => Err(EngineError::Validation(format!(
            "{field} must be an ISO-8601 timestamp with explicit timezone \
             (e.g. '2026-03-01T12:00:00Z'), got '{value}'"
        ))),
    }
}

/// Hours elapsed between two canonical timestamps. Returns `None` when
/// either fails to parse.
pub fn hours_between(earlier: &str, later: &str) -> Option<f64> {
    let a = DateTime::parse_from_rfc3339(earlier).ok()?;
    let b = DateTime::parse_from_rfc3339(later).ok()?;
    Some((b - a).num_milliseconds() as f64 / 3_600_000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_has_micros_and_z() {
        let now = now_iso();
        assert!(now.ends_with('Z'));
        // 2026-08-02T12:34:56.123456Z — fractional part is 6 digits
        let frac = now.split('.').nth(1).unwrap();
        assert_eq!(frac.len(), 7); // 6 digits + 'Z'
    }

    #[test]
    fn canonical_format_sorts_lexicographically() {
        let earlier = "2026-01-01T00:00:00.000000Z";
        let later = "2026-01-01T00:00:00.000001Z";
        assert!(earlier < later);
    }

    #[test]
    fn parse_accepts_z_suffix() {
        let parsed = parse_required_tz("2026-03-01T12:00:00Z", "due_date").unwrap();
        assert_eq!(parsed, "2026-03-01T12:00:00.000000Z");
    }

    #[test]
    fn parse_accepts_offset_and_normalises() {
        let parsed = parse_required_tz("2026-03-01T14:00:00+02:00", "due_date").unwrap();
        assert_eq!(parsed, "2026-03-01T12:00:00.000000Z");
    }

    #[test]
    fn parse_rejects_naive_timestamp() {
        let err = parse_required_tz("2026-03-01T12:00:00", "due_date").unwrap_err();
        assert_eq!(err.kind(), "VALIDATION_ERROR");
        assert!(err.to_string().contains("due_date"));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_required_tz("next tuesday", "due_date").is_err());
    }

    #[test]
    fn hours_between_computes_delta() {
        let h =
            hours_between("2026-01-01T00:00:00.000000Z", "2026-01-02T01:00:00.000000Z").unwrap();
        assert!((h - 25.0).abs() < 1e-9);
    }

    #[test]
    fn hours_from_now_is_ordered() {
        let past = hours_from_now(-1.0);
        let now = now_iso();
        let future = hours_from_now(1.0);
        assert!(past < now);
        assert!(now < future);
    }
}
