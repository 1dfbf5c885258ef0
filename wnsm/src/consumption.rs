use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{client::Smartmeter, metering_point::ResolvedMeteringPoint, prelude::*, timestamp};

/// Resolution of the single-day consumption view.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Resolution {
    #[default]
    Hour,

    QuarterHour,
}

impl Resolution {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hour => "HOUR",
            Self::QuarterHour => "QUARTER-HOUR",
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Consumption {
    #[serde(rename = "quarter-hour-opt-in", default, skip_serializing_if = "Option::is_none")]
    pub quarter_hour_opt_in: Option<bool>,

    #[serde(default)]
    pub values: Vec<ConsumptionValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<ConsumptionStatistics>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionValue {
    /// `None` until the value is settled by the backend.
    pub value: Option<f64>,

    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub is_estimated: bool,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ConsumptionStatistics {
    pub maximum: Option<f64>,
    pub minimum: Option<f64>,
    pub average: Option<f64>,
}

impl Smartmeter {
    /// Hourly or quarter-hourly consumption for the 24 hours after `from`.
    pub async fn consumption(
        &self,
        metering_point: Option<&str>,
        from: DateTime<Utc>,
        resolution: Resolution,
    ) -> Result<Consumption> {
        let metering_point = self.resolve(metering_point).await?;
        self.consumption_for(&metering_point, from, resolution).await
    }

    #[instrument(skip_all, fields(metering_point = metering_point.id(), from = %from))]
    pub async fn consumption_for(
        &self,
        metering_point: &ResolvedMeteringPoint,
        from: DateTime<Utc>,
        resolution: Resolution,
    ) -> Result<Consumption> {
        let endpoint =
            format!("messdaten/{}/{}/verbrauch", metering_point.customer_id, metering_point.id());
        let query = [
            ("period", "DAY".to_owned()),
            ("accumulate", "false".to_owned()),
            ("offset", "0".to_owned()),
            ("dayViewResolution", resolution.as_str().to_owned()),
            ("dateFrom", timestamp::format(&from)),
        ];
        self.request(&self.endpoints.b2c_api, &endpoint, Method::GET, &query, None).await
    }

    /// Daily consumption over a longer period, `until` defaults to now.
    pub async fn consumption_raw(
        &self,
        metering_point: Option<&str>,
        from: DateTime<Utc>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Consumption> {
        let metering_point = self.resolve(metering_point).await?;
        self.consumption_raw_for(&metering_point, from, until.unwrap_or_else(Utc::now)).await
    }

    #[instrument(
        skip_all,
        fields(metering_point = metering_point.id(), from = %from, until = %until),
    )]
    pub async fn consumption_raw_for(
        &self,
        metering_point: &ResolvedMeteringPoint,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Consumption> {
        let endpoint = format!(
            "messdaten/{}/{}/verbrauchRaw",
            metering_point.customer_id,
            metering_point.id(),
        );
        let query = [
            ("dateFrom", timestamp::format(&from)),
            ("dateTo", timestamp::format(&until)),
            ("granularity", "DAY".to_owned()),
        ];
        self.request(&self.endpoints.b2c_api, &endpoint, Method::GET, &query, None).await
    }

    pub async fn consumptions(&self) -> Result<Value> {
        self.request(&self.endpoints.b2c_api, "zaehlpunkt/consumptions", Method::GET, &[], None)
            .await
    }

    pub async fn base_information(&self) -> Result<Value> {
        self.request(&self.endpoints.b2c_api, "zaehlpunkt/baseInformation", Method::GET, &[], None)
            .await
    }

    pub async fn meter_readings(&self) -> Result<Value> {
        self.request(&self.endpoints.b2c_api, "zaehlpunkt/meterReadings", Method::GET, &[], None)
            .await
    }
}
