use chrono::{DateTime, DurationRound, NaiveDate, TimeDelta, Utc};
use serde::Serializer;
use serde_with::SerializeAs;

const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Portal timestamp: UTC with milliseconds, `2024-11-11T23:00:00.000Z`.
pub fn format(timestamp: &DateTime<Utc>) -> String {
    timestamp.format(FORMAT).to_string()
}

/// Start of the day in the movement data query format.
pub fn start_of_day(date: NaiveDate) -> String {
    date.format("%Y-%m-%dT00:00:00.000Z").to_string()
}

/// End of the day in the movement data query format.
pub fn end_of_day(date: NaiveDate) -> String {
    date.format("%Y-%m-%dT23:59:59.999Z").to_string()
}

/// Truncate to the top of the hour.
pub fn start_of_hour(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    timestamp.duration_trunc(TimeDelta::hours(1)).unwrap_or(timestamp)
}

/// [`serde_with`] adapter for request payloads.
pub struct PortalTimestamp;

impl SerializeAs<DateTime<Utc>> for PortalTimestamp {
    fn serialize_as<S: Serializer>(
        source: &DateTime<Utc>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&source.format(FORMAT))
    }
}
