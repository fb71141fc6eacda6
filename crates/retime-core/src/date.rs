//! ISO-8601 parsing and formatting for timeline anchors.
//!
//! Git stores seconds, so everything here is unix seconds in UTC.

use anyhow::{bail, Result};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};

pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Parse an ISO-8601 instant into unix seconds.
///
/// Accepts RFC 3339 (`2025-06-18T09:00:00Z`, `2025-06-18T09:00:00+02:00`),
/// naive date-times (`2025-06-18T09:00:00`, read as UTC) and plain dates
/// (`2025-06-18`, midnight UTC). Fractional seconds are floored.
pub fn parse_iso8601(input: &str) -> Result<i64> {
    let s = input.trim();
    if s.is_empty() {
        bail!("empty date");
    }
    if let Ok(dt) = OffsetDateTime::parse(s, &Rfc3339) {
        return Ok(dt.unix_timestamp());
    }
    let naive = PrimitiveDateTime::parse(
        s,
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    )
    .or_else(|_| {
        PrimitiveDateTime::parse(
            s,
            format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
        )
    })
    .or_else(|_| {
        PrimitiveDateTime::parse(s, format_description!("[year]-[month]-[day]T[hour]:[minute]"))
    });
    if let Ok(dt) = naive {
        return Ok(dt.assume_utc().unix_timestamp());
    }
    let date_only = format_description!("[year]-[month]-[day]");
    if let Ok(d) = Date::parse(s, date_only) {
        return Ok(PrimitiveDateTime::new(d, Time::MIDNIGHT)
            .assume_utc()
            .unix_timestamp());
    }
    bail!("'{input}' is not a valid ISO-8601 date")
}

/// Format unix seconds as RFC 3339 UTC (`2025-06-18T09:00:00Z`).
pub fn format_timestamp(ts: i64) -> String {
    OffsetDateTime::from_unix_timestamp(ts)
        .ok()
        .and_then(|dt| dt.format(&Rfc3339).ok())
        .unwrap_or_else(|| format!("@{ts}"))
}

/// Whether `ts` falls inside the range [`OffsetDateTime`] supports.
pub fn is_representable(ts: i64) -> bool {
    OffsetDateTime::from_unix_timestamp(ts).is_ok()
}

/// Current time, truncated to whole seconds.
pub fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

pub fn seconds_to_days(secs: f64) -> f64 {
    secs / SECONDS_PER_DAY
}
