use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use derive_more::{AsRef, Display};
use serde::{Deserialize, Serialize};

use crate::{metering_point::ResolvedMeteringPoint, prelude::*};

/// Identifier of the cumulative series of a metering point: `wnsm:<lowercase ID>`.
#[derive(Clone, Debug, Display, AsRef, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[as_ref(str)]
pub struct SeriesId(String);

impl SeriesId {
    pub const SOURCE: &str = "wnsm";

    #[must_use]
    pub fn for_metering_point(metering_point: &str) -> Self {
        Self(format!("{}:{}", Self::SOURCE, metering_point.to_lowercase()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesMetadata {
    pub series_id: SeriesId,
    pub source: String,
    pub name: String,
    pub unit: String,
    pub has_sum: bool,
    pub has_mean: bool,
}

impl SeriesMetadata {
    #[must_use]
    pub fn for_metering_point(metering_point: &ResolvedMeteringPoint) -> Self {
        Self {
            series_id: SeriesId::for_metering_point(metering_point.id()),
            source: SeriesId::SOURCE.to_owned(),
            name: metering_point.point.name().to_owned(),
            unit: "kWh".to_owned(),
            has_sum: true,
            has_mean: false,
        }
    }
}

/// Hourly point of the cumulative statistic.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct StatisticPoint {
    pub start: DateTime<Utc>,

    /// Cumulative kilowatt-hours at the end of the hour.
    pub sum: f64,

    /// Kilowatt-hours within the hour.
    pub state: f64,
}

impl StatisticPoint {
    pub const DURATION: TimeDelta = TimeDelta::hours(1);

    #[must_use]
    pub fn end(&self) -> DateTime<Utc> {
        self.start + Self::DURATION
    }
}

/// The latest persisted point, used to resume the import.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LastPoint {
    pub sum: f64,
    pub end: DateTime<Utc>,
}

impl From<&StatisticPoint> for LastPoint {
    fn from(point: &StatisticPoint) -> Self {
        Self { sum: point.sum, end: point.end() }
    }
}

/// Append-only storage of the cumulative statistics.
#[async_trait]
pub trait StatisticsStore: Send + Sync {
    async fn last_point(&self, series_id: &SeriesId) -> Result<Option<LastPoint>>;

    /// Append the points in a single batch, creating or updating the metadata.
    async fn append_points(&self, metadata: &SeriesMetadata, points: &[StatisticPoint]) -> Result;
}
