pub mod aggregate;

use std::ops::Range;

use bon::Builder;
use chrono::{DateTime, NaiveTime, TimeDelta, Utc};

use self::aggregate::aggregate;
use crate::{
    client::Smartmeter,
    historical::ValueType,
    metering_point::ResolvedMeteringPoint,
    prelude::*,
    statistics::{LastPoint, SeriesId, SeriesMetadata, StatisticsStore},
    timestamp,
};

/// Outcome of a single import cycle.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ImportOutcome {
    /// The metering point is inactive, nothing has been queried.
    Inactive,

    /// The last point is younger than [`Importer::MIN_WAIT`], the backend has not been called.
    UpToDate { last: LastPoint },

    Imported {
        windows: usize,
        points: usize,

        /// Cumulative sum after the last imported point.
        sum: f64,

        /// The trailing windows had no movement data yet, the next cycle queries them again.
        stopped_early: bool,
    },
}

/// Outcome of a single calendar window.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum WindowOutcome {
    Imported { points: usize, sum: f64 },

    /// Nothing to persist: zero consumption, or no settled reading within the window.
    Skipped,

    /// Empty movement data: not available yet, a gap, or a period before the meter was installed.
    NotYetAvailable,
}

/// Incremental import of the movement data into a cumulative hourly statistic.
#[derive(Builder)]
pub struct Importer<S> {
    smartmeter: Smartmeter,
    store: S,

    #[builder(into)]
    metering_point: String,

    /// Granularity of the movement data, quarter-hourly or daily.
    #[builder(default)]
    value_type: ValueType,

    /// Span of a single movement data query.
    #[builder(default = TimeDelta::days(30))]
    window: TimeDelta,

    /// Maximum number of windows imported in a single cycle.
    #[builder(default = 64)]
    max_windows: usize,

    /// How far back the very first cycle starts.
    #[builder(default = TimeDelta::days(3 * 365))]
    history: TimeDelta,
}

impl<S: StatisticsStore> Importer<S> {
    pub const MIN_WAIT: TimeDelta = TimeDelta::hours(24);

    pub const fn store(&self) -> &S {
        &self.store
    }

    pub async fn run_cycle(&mut self) -> Result<ImportOutcome> {
        self.run_cycle_at(Utc::now()).await
    }

    /// Run a cycle as if it were `now`.
    #[instrument(skip_all, fields(metering_point = %self.metering_point))]
    pub async fn run_cycle_at(&mut self, now: DateTime<Utc>) -> Result<ImportOutcome> {
        let series_id = SeriesId::for_metering_point(&self.metering_point);
        let last = self.store.last_point(&series_id).await?;
        if let Some(last) = last
            && now - last.end < Self::MIN_WAIT
        {
            debug!(end = %last.end, "last point is too recent, skipping");
            return Ok(ImportOutcome::UpToDate { last });
        }

        self.smartmeter.login().await?;
        let metering_point = self.smartmeter.resolve(Some(&self.metering_point)).await?;
        if !metering_point.point.is_active() {
            info!("metering point is not active");
            return Ok(ImportOutcome::Inactive);
        }
        let metadata = SeriesMetadata::for_metering_point(&metering_point);

        let (mut start, mut sum) = match last {
            Some(last) => (timestamp::start_of_hour(last.end), last.sum),
            None => {
                let start = (now - self.history).date_naive().and_time(NaiveTime::MIN).and_utc();
                info!(%start, "starting the historical import, this might take a while…");
                (start, 0.0)
            }
        };
        let end = timestamp::start_of_hour(now);
        if start >= end {
            warn!(%start, %end, "the last point is ahead of now, nothing to import");
        }

        let mut windows = 0;
        let mut points = 0;

        // Consecutive empty windows since the last one with any data.
        let mut n_empty = 0;

        while start < end {
            if windows == self.max_windows {
                error!(
                    windows,
                    %start,
                    %end,
                    "reached the window limit, the import continues next cycle",
                );
                break;
            }
            let window = start..(start + self.window).min(end);
            windows += 1;
            match self.import_window(&metering_point, &metadata, &window, sum).await? {
                WindowOutcome::Imported { points: n_points, sum: new_sum } => {
                    if n_empty != 0 {
                        warn!(n_empty, "skipped windows without movement data");
                    }
                    n_empty = 0;
                    points += n_points;
                    sum = new_sum;
                }
                WindowOutcome::Skipped => {
                    n_empty = 0;
                }
                WindowOutcome::NotYetAvailable => {
                    n_empty += 1;
                }
            }
            start = window.end;
        }
        let stopped_early = n_empty != 0;

        info!(windows, points, sum, stopped_early, "imported");
        Ok(ImportOutcome::Imported { windows, points, sum, stopped_early })
    }

    #[instrument(skip_all, fields(start = %window.start, end = %window.end))]
    async fn import_window(
        &self,
        metering_point: &ResolvedMeteringPoint,
        metadata: &SeriesMetadata,
        window: &Range<DateTime<Utc>>,
        sum: f64,
    ) -> Result<WindowOutcome> {
        let from = window.start.date_naive();
        let until = (window.end - TimeDelta::milliseconds(1)).date_naive();
        let data = match self
            .smartmeter
            .movement_data_for(metering_point, from, until, self.value_type)
            .await
        {
            Ok(data) => data,
            Err(Error::Query(QueryError::EmptyDataset)) => {
                info!("no movement data within the window");
                return Ok(WindowOutcome::NotYetAvailable);
            }
            Err(error) => return Err(error),
        };
        let factor = data.unit()?.kilowatt_hours();

        let total: f64 = data.values.iter().filter_map(|value| value.value).sum();
        #[expect(clippy::float_cmp)]
        let is_zero = total == 0.0;
        if is_zero {
            debug!("no consumption, skipping");
            return Ok(WindowOutcome::Skipped);
        }

        let aggregation = aggregate(&data.values, factor, window, sum);
        if aggregation.n_discarded != 0 || aggregation.n_pending != 0 {
            debug!(
                n_discarded = aggregation.n_discarded,
                n_pending = aggregation.n_pending,
                "some readings were not imported",
            );
        }
        if aggregation.points.is_empty() {
            debug!("no settled readings within the window, skipping");
            return Ok(WindowOutcome::Skipped);
        }
        self.store.append_points(metadata, &aggregation.points).await?;
        Ok(WindowOutcome::Imported { points: aggregation.points.len(), sum: aggregation.sum })
    }
}
