use chrono::{DateTime, Months, NaiveDate, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::{client::Smartmeter, metering_point::ResolvedMeteringPoint, prelude::*};

/// OBIS codes of the registers counting electrical energy: consumption and feed-in totals.
pub const VALID_OBIS_CODES: [&str; 4] = ["1-1:1.8.0", "1-1:1.9.0", "1-1:2.8.0", "1-1:2.9.0"];

/// `wertetyp` of the historical and movement data queries.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ValueType {
    /// Meter reading at the end of each day.
    MeterRead,

    /// Consumption per day.
    Day,

    /// Consumption per 15 minutes.
    #[default]
    QuarterHour,
}

impl ValueType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MeterRead => "METER_READ",
            Self::Day => "DAY",
            Self::QuarterHour => "QUARTER_HOUR",
        }
    }
}

#[derive(Deserialize)]
struct HistoricalResponse {
    zaehlpunkt: String,

    #[serde(default)]
    zaehlwerke: Option<Vec<MeasurementChannel>>,
}

/// Single register (Zählwerk) of a metering point.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MeasurementChannel {
    #[serde(rename = "obisCode", default)]
    pub obis_code: Option<String>,

    #[serde(rename = "einheit")]
    pub unit: String,

    #[serde(rename = "messwerte", default)]
    pub values: Vec<MeasurementValue>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MeasurementValue {
    #[serde(rename = "messwert")]
    pub value: Option<f64>,

    #[serde(rename = "zeitVon")]
    pub from: DateTime<Utc>,

    #[serde(rename = "zeitBis")]
    pub until: DateTime<Utc>,

    #[serde(rename = "qualitaet", default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
}

impl Smartmeter {
    /// Batch of historical values, defaulting to the three years ending today.
    pub async fn historical_data(
        &self,
        metering_point: Option<&str>,
        from: Option<NaiveDate>,
        until: Option<NaiveDate>,
        value_type: ValueType,
    ) -> Result<MeasurementChannel> {
        let metering_point = self.resolve(metering_point).await?;
        let until = until.unwrap_or_else(|| Utc::now().date_naive());
        let from = from.unwrap_or_else(|| three_years_before(until));
        self.historical_data_for(&metering_point, from, until, value_type).await
    }

    /// Query the historical values and pick the first register with a valid OBIS code.
    ///
    /// An empty register is returned as is: the data may simply not be available yet.
    #[instrument(
        skip_all,
        fields(
            metering_point = metering_point.id(),
            from = %from,
            until = %until,
            value_type = value_type.as_str(),
        ),
    )]
    pub async fn historical_data_for(
        &self,
        metering_point: &ResolvedMeteringPoint,
        from: NaiveDate,
        until: NaiveDate,
        value_type: ValueType,
    ) -> Result<MeasurementChannel> {
        let endpoint =
            format!("zaehlpunkte/{}/{}/messwerte", metering_point.customer_id, metering_point.id());
        let query = [
            ("datumVon", from.format("%Y-%m-%d").to_string()),
            ("datumBis", until.format("%Y-%m-%d").to_string()),
            ("wertetyp", value_type.as_str().to_owned()),
        ];
        let response: HistoricalResponse =
            self.request(&self.endpoints.b2b_api, &endpoint, Method::GET, &query, None).await?;
        select_channel(metering_point.id(), response)
    }

    /// Meter reading in kilowatt-hours at the start of the range, if available.
    pub async fn meter_reading(
        &self,
        metering_point: Option<&str>,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<Option<f64>> {
        let channel =
            self.historical_data(metering_point, Some(from), Some(until), ValueType::MeterRead)
                .await?;
        Ok(channel.values.first().and_then(|value| value.value).map(|value| value / 1000.0))
    }
}

fn three_years_before(date: NaiveDate) -> NaiveDate {
    date.checked_sub_months(Months::new(36)).unwrap_or(NaiveDate::MIN)
}

fn select_channel(expected: &str, response: HistoricalResponse) -> Result<MeasurementChannel> {
    if response.zaehlpunkt != expected {
        return Err(QueryError::MeteringPointMismatch {
            expected: expected.to_owned(),
            actual: response.zaehlpunkt,
        }
        .into());
    }
    let channels = response.zaehlwerke.unwrap_or_default();
    if channels.is_empty() {
        return Err(QueryError::NoMeasurementChannels.into());
    }
    let (valid, found) = partition_channels(channels);
    if valid.len() > 1 {
        warn!(n_valid = valid.len(), "multiple valid OBIS codes found, taking the first one");
    }
    valid.into_iter().next().ok_or_else(|| QueryError::NoValidObisCode { found }.into())
}

/// Split the channels into those with a known OBIS code, in their order, and the codes of the rest.
fn partition_channels(channels: Vec<MeasurementChannel>) -> (Vec<MeasurementChannel>, Vec<String>) {
    let (valid, invalid): (Vec<_>, Vec<_>) = channels.into_iter().partition(|channel| {
        channel.obis_code.as_deref().is_some_and(|code| VALID_OBIS_CODES.contains(&code))
    });
    let found = invalid.into_iter().map(|channel| channel.obis_code.unwrap_or_default()).collect();
    (valid, found)
}
