//! Local time offsets for recorders that only log UTC.

use chrono::{FixedOffset, NaiveDateTime, Offset, Utc};

/// Answers "what was the local UTC offset here, then?".
pub trait TimezoneLookup: Send + Sync + std::fmt::Debug {
    /// Offset from UTC at `(latitude, longitude)` at the UTC instant `utc`.
    fn offset_at(&self, latitude: f64, longitude: f64, utc: NaiveDateTime) -> FixedOffset;
}

/// Nautical time zones: one hour per 15° of longitude.
///
/// Used when no zone database is plugged in. Ignores daylight saving and
/// political boundaries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NauticalTimezone;

impl TimezoneLookup for NauticalTimezone {
    #[allow(clippy::cast_possible_truncation)]
    fn offset_at(&self, _latitude: f64, longitude: f64, _utc: NaiveDateTime) -> FixedOffset {
        let hours = if longitude.is_finite() {
            (longitude / 15.0).round().clamp(-12.0, 12.0) as i32
        } else {
            0
        };
        FixedOffset::east_opt(hours * 3600).unwrap_or_else(utc)
    }
}

/// The UTC offset.
#[must_use]
pub fn utc() -> FixedOffset {
    Utc.fix()
}

/// Render an offset the way recorders log it (`+HH:MM`).
#[must_use]
pub fn format_offset(offset: FixedOffset) -> String {
    let seconds = offset.local_minus_utc();
    let sign = if seconds < 0 { '-' } else { '+' };
    let minutes = seconds.unsigned_abs() / 60;
    format!("{sign}{:02}:{:02}", minutes / 60, minutes % 60)
}
