use async_trait::async_trait;
use bson::doc;
use chrono::{DateTime, Utc};
use mongodb::{
    Collection,
    Database,
    IndexModel,
    options::IndexOptions,
};
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use wnsm::{LastPoint, SeriesId, SeriesMetadata, StatisticPoint, StatisticsStore};

use crate::prelude::*;

/// Hourly point as persisted in the `statistics` collection.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticDocument {
    pub series_id: SeriesId,

    #[serde_as(as = "bson::serde_helpers::datetime::FromChrono04DateTime")]
    pub start: DateTime<Utc>,

    pub sum: f64,
    pub state: f64,
}

impl StatisticDocument {
    fn new(series_id: &SeriesId, point: &StatisticPoint) -> Self {
        Self {
            series_id: series_id.clone(),
            start: point.start,
            sum: point.sum,
            state: point.state,
        }
    }
}

impl From<StatisticDocument> for LastPoint {
    fn from(document: StatisticDocument) -> Self {
        Self { sum: document.sum, end: document.start + StatisticPoint::DURATION }
    }
}

/// MongoDB-backed [`StatisticsStore`].
#[must_use]
pub struct Statistics {
    points: Collection<StatisticDocument>,
    metadata: Collection<SeriesMetadata>,
}

impl Statistics {
    const COLLECTION_NAME: &'static str = "statistics";
    const METADATA_COLLECTION_NAME: &'static str = "statisticsMetadata";

    /// Create the unique indices, so that a point can never be appended twice.
    #[instrument(skip_all)]
    pub async fn initialize(db: &Database) -> Result<Self> {
        let this = Self {
            points: db.collection(Self::COLLECTION_NAME),
            metadata: db.collection(Self::METADATA_COLLECTION_NAME),
        };
        let unique = || IndexOptions::builder().unique(true).build();
        this.points
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "seriesId": 1, "start": 1 })
                    .options(unique())
                    .build(),
            )
            .await
            .context("failed to create the statistics index")?;
        this.metadata
            .create_index(
                IndexModel::builder().keys(doc! { "seriesId": 1 }).options(unique()).build(),
            )
            .await
            .context("failed to create the metadata index")?;
        Ok(this)
    }
}

#[async_trait]
impl StatisticsStore for Statistics {
    #[instrument(skip_all, fields(series_id = %series_id))]
    async fn last_point(&self, series_id: &SeriesId) -> wnsm::Result<Option<LastPoint>> {
        debug!("fetching the last point…");
        let document = self
            .points
            .find_one(doc! { "seriesId": series_id.to_string() })
            .sort(doc! { "start": -1 })
            .await
            .map_err(wnsm::Error::store)?;
        Ok(document.map(LastPoint::from))
    }

    #[instrument(skip_all, fields(series_id = %metadata.series_id, n_points = points.len()))]
    async fn append_points(
        &self,
        metadata: &SeriesMetadata,
        points: &[StatisticPoint],
    ) -> wnsm::Result {
        if points.is_empty() {
            return Ok(());
        }
        info!("appending…");
        let documents =
            points.iter().map(|point| StatisticDocument::new(&metadata.series_id, point));
        self.points.insert_many(documents).await.map_err(wnsm::Error::store)?;
        self.metadata
            .replace_one(doc! { "seriesId": metadata.series_id.to_string() }, metadata)
            .upsert(true)
            .await
            .map_err(wnsm::Error::store)?;
        Ok(())
    }
}
