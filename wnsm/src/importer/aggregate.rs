use std::{collections::BTreeMap, ops::Range};

use chrono::{DateTime, Timelike, Utc};

use crate::{movement::MovementValue, prelude::*, statistics::StatisticPoint, timestamp};

/// Hourly cumulative points built from a single window of readings.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Aggregation {
    pub points: Vec<StatisticPoint>,

    /// Cumulative sum after the last point.
    pub sum: f64,

    /// Readings going back in time or negative.
    pub n_discarded: usize,

    /// Readings the backend has not settled yet.
    pub n_pending: usize,
}

/// Bucket the readings within the window by hour and accumulate them on top of `sum`.
///
/// Readings are walked in the order the backend returned them. Readings outside the window are
/// ignored so that neighbouring windows never count a reading twice.
pub fn aggregate(
    values: &[MovementValue],
    factor: f64,
    window: &Range<DateTime<Utc>>,
    sum: f64,
) -> Aggregation {
    let mut buckets = BTreeMap::<DateTime<Utc>, f64>::new();
    let mut last_timestamp = window.start;
    let mut n_discarded = 0;
    let mut n_pending = 0;

    for value in values {
        let timestamp = value.from;
        if !window.contains(&timestamp) {
            trace!(%timestamp, "outside of the window");
            continue;
        }
        if timestamp < last_timestamp {
            warn!(%timestamp, %last_timestamp, "reading goes back in time, discarding");
            n_discarded += 1;
            continue;
        }
        last_timestamp = timestamp;

        let Some(reading) = value.value else {
            n_pending += 1;
            continue;
        };
        if reading < 0.0 {
            warn!(%timestamp, reading, "negative reading, discarding");
            n_discarded += 1;
            continue;
        }
        if timestamp.minute() % 15 != 0 || timestamp.second() != 0 || timestamp.nanosecond() != 0 {
            warn!(%timestamp, "unexpected reading alignment");
        }
        if value.is_estimated {
            debug!(%timestamp, reading, "estimated reading");
        }
        *buckets.entry(timestamp::start_of_hour(timestamp)).or_default() += reading * factor;
    }

    let mut sum = sum;
    let points = buckets
        .into_iter()
        .map(|(start, state)| {
            sum += state;
            StatisticPoint { start, sum, state }
        })
        .collect();
    Aggregation { points, sum, n_discarded, n_pending }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use chrono::{TimeDelta, TimeZone};
    use itertools::Itertools;

    use super::*;

    fn reading(timestamp: DateTime<Utc>, value: Option<f64>) -> MovementValue {
        MovementValue {
            value,
            from: timestamp,
            until: Some(timestamp + TimeDelta::minutes(15)),
            is_estimated: false,
        }
    }

    fn quarter_hours(start: DateTime<Utc>, values: &[Option<f64>]) -> Vec<MovementValue> {
        values
            .iter()
            .enumerate()
            .map(|(i, value)| {
                reading(start + TimeDelta::minutes(15) * i32::try_from(i).unwrap(), *value)
            })
            .collect()
    }

    fn day(start: DateTime<Utc>) -> Range<DateTime<Utc>> {
        start..start + TimeDelta::days(1)
    }

    #[test]
    fn test_hourly_buckets() {
        let start = Utc.with_ymd_and_hms(2024, 11, 11, 23, 0, 0).unwrap();
        let values = quarter_hours(
            start,
            &[Some(100.0), Some(200.0), Some(300.0), Some(400.0), Some(500.0), Some(500.0)],
        );
        let aggregation = aggregate(&values, 0.001, &day(start), 10.0);
        assert_eq!(aggregation.points.len(), 2);
        assert_eq!(aggregation.points[0].start, start);
        assert_relative_eq!(aggregation.points[0].state, 1.0);
        assert_relative_eq!(aggregation.points[0].sum, 11.0);
        assert_eq!(aggregation.points[1].start, start + TimeDelta::hours(1));
        assert_relative_eq!(aggregation.points[1].state, 1.0);
        assert_relative_eq!(aggregation.points[1].sum, 12.0);
        assert_relative_eq!(aggregation.sum, 12.0);
    }

    #[test]
    fn test_pending_readings_are_skipped() {
        let start = Utc.with_ymd_and_hms(2024, 11, 11, 0, 0, 0).unwrap();
        let values =
            quarter_hours(start, &[Some(1.0), None, Some(2.0), None, None, None, None, None]);
        let aggregation = aggregate(&values, 1.0, &day(start), 0.0);
        assert_eq!(aggregation.n_pending, 6);
        assert_eq!(aggregation.points.len(), 1, "an hour of only pending readings emits nothing");
        assert_relative_eq!(aggregation.points[0].state, 3.0);
    }

    #[test]
    fn test_out_of_order_reading_is_discarded() {
        let start = Utc.with_ymd_and_hms(2024, 10, 27, 0, 0, 0).unwrap();
        let values = vec![
            reading(start, Some(1.0)),
            reading(start + TimeDelta::minutes(30), Some(2.0)),
            reading(start + TimeDelta::minutes(15), Some(100.0)),
            reading(start + TimeDelta::minutes(45), Some(3.0)),
        ];
        let aggregation = aggregate(&values, 1.0, &day(start), 0.0);
        assert_eq!(aggregation.n_discarded, 1);
        assert_relative_eq!(aggregation.sum, 6.0);
    }

    #[test]
    fn test_outside_and_negative_readings() {
        let start = Utc.with_ymd_and_hms(2024, 11, 11, 0, 0, 0).unwrap();
        let values = vec![
            reading(start - TimeDelta::minutes(15), Some(7.0)),
            reading(start, Some(-1.0)),
            reading(start + TimeDelta::minutes(15), Some(2.0)),
            reading(start + TimeDelta::days(1), Some(7.0)),
        ];
        let aggregation = aggregate(&values, 1.0, &day(start), 5.0);
        assert_eq!(aggregation.n_discarded, 1);
        assert_eq!(aggregation.points.len(), 1);
        assert_relative_eq!(aggregation.sum, 7.0);
    }

    #[test]
    fn test_three_years_with_pending_readings() {
        let start = Utc.with_ymd_and_hms(2021, 11, 13, 0, 0, 0).unwrap();
        let n_hours = 3 * 365 * 24;
        let values: Vec<_> =
            (0..n_hours * 4).map(|i| if i % 10 == 0 { None } else { Some(250.0) }).collect();
        let values = quarter_hours(start, &values);
        let window = start..start + TimeDelta::hours(i64::from(n_hours));

        let aggregation = aggregate(&values, 0.001, &window, 0.0);

        let n_settled = values.iter().filter(|value| value.value.is_some()).count();
        assert_eq!(aggregation.n_pending, values.len() - n_settled);
        assert_eq!(aggregation.points.len(), usize::try_from(n_hours).unwrap());
        assert!(aggregation.points.iter().tuple_windows().all(|(lhs, rhs)| lhs.sum <= rhs.sum));
        assert!(aggregation.points.iter().all(|point| point.state >= 0.5 && point.state <= 1.0));
        #[expect(clippy::cast_precision_loss)]
        let expected = n_settled as f64 * 0.25;
        assert_relative_eq!(aggregation.sum, expected, max_relative = 1e-9);
    }
}
