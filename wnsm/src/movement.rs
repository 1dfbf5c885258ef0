use chrono::{DateTime, Months, NaiveDate, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::{
    client::Smartmeter,
    historical::ValueType,
    metering_point::{InstallationType, ResolvedMeteringPoint},
    prelude::*,
    timestamp,
    unit::Unit,
};

/// Backend role scoping the movement data to a direction and granularity.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RoleType {
    DailyConsuming,
    QuarterHourlyConsuming,
    DailyFeeding,
    QuarterHourlyFeeding,
}

impl RoleType {
    /// Anything but `Day` maps to the quarter-hourly role.
    #[must_use]
    pub const fn new(installation_type: InstallationType, value_type: ValueType) -> Self {
        match (installation_type, value_type) {
            (InstallationType::Consuming, ValueType::Day) => Self::DailyConsuming,
            (InstallationType::Consuming, _) => Self::QuarterHourlyConsuming,
            (InstallationType::Feeding, ValueType::Day) => Self::DailyFeeding,
            (InstallationType::Feeding, _) => Self::QuarterHourlyFeeding,
        }
    }

    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::DailyConsuming => "V001",
            Self::QuarterHourlyConsuming => "V002",
            Self::DailyFeeding => "E001",
            Self::QuarterHourlyFeeding => "E002",
        }
    }
}

#[derive(Deserialize)]
struct MovementResponse {
    descriptor: MovementDescriptor,

    /// Missing altogether when the backend reports an error with a successful status.
    #[serde(default)]
    values: Option<Vec<MovementValue>>,
}

/// Movement data (Bewegungsdaten): the granular readings of one role.
#[derive(Clone, Debug, Serialize)]
pub struct MovementData {
    pub descriptor: MovementDescriptor,
    pub values: Vec<MovementValue>,
}

impl MovementData {
    pub fn unit(&self) -> Result<Unit> {
        self.descriptor.unit.parse()
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MovementDescriptor {
    #[serde(rename = "geschaeftspartnernummer", default)]
    pub customer_id: Option<String>,

    #[serde(rename = "zaehlpunktnummer")]
    pub metering_point: String,

    #[serde(rename = "rolle", default)]
    pub role: Option<String>,

    #[serde(default)]
    pub aggregat: Option<String>,

    #[serde(rename = "granularitaet", default)]
    pub granularity: Option<String>,

    /// `WH` or `KWH`.
    #[serde(rename = "einheit")]
    pub unit: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MovementValue {
    /// `None` until the value is settled by the backend.
    #[serde(rename = "wert")]
    pub value: Option<f64>,

    #[serde(rename = "zeitpunktVon")]
    pub from: DateTime<Utc>,

    #[serde(rename = "zeitpunktBis", default)]
    pub until: Option<DateTime<Utc>>,

    #[serde(rename = "geschaetzt", default)]
    pub is_estimated: bool,
}

impl Smartmeter {
    /// Movement data for whole days, defaulting to the three years ending today.
    pub async fn movement_data(
        &self,
        metering_point: Option<&str>,
        from: Option<NaiveDate>,
        until: Option<NaiveDate>,
        value_type: ValueType,
    ) -> Result<MovementData> {
        let metering_point = self.resolve(metering_point).await?;
        let until = until.unwrap_or_else(|| Utc::now().date_naive());
        let from = from
            .unwrap_or_else(|| until.checked_sub_months(Months::new(36)).unwrap_or(NaiveDate::MIN));
        self.movement_data_for(&metering_point, from, until, value_type).await
    }

    /// Fails with [`QueryError::EmptyDataset`] when there are no values for the range.
    #[instrument(
        skip_all,
        fields(
            metering_point = metering_point.id(),
            from = %from,
            until = %until,
            value_type = value_type.as_str(),
        ),
    )]
    pub async fn movement_data_for(
        &self,
        metering_point: &ResolvedMeteringPoint,
        from: NaiveDate,
        until: NaiveDate,
        value_type: ValueType,
    ) -> Result<MovementData> {
        let role = RoleType::new(metering_point.installation_type()?, value_type);
        let query = [
            ("geschaeftspartner", metering_point.customer_id.clone()),
            ("zaehlpunktnummer", metering_point.id().to_owned()),
            ("rolle", role.code().to_owned()),
            ("zeitpunktVon", timestamp::start_of_day(from)),
            ("zeitpunktBis", timestamp::end_of_day(until)),
            ("aggregat", "NONE".to_owned()),
        ];
        let response: MovementResponse = self
            .request(
                &self.endpoints.service_api,
                "user/messwerte/bewegungsdaten",
                Method::GET,
                &query,
                None,
            )
            .await?;
        validate(metering_point.id(), response)
    }
}

fn validate(expected: &str, response: MovementResponse) -> Result<MovementData> {
    if response.descriptor.metering_point != expected {
        return Err(QueryError::MeteringPointMismatch {
            expected: expected.to_owned(),
            actual: response.descriptor.metering_point,
        }
        .into());
    }
    let values = response
        .values
        .ok_or_else(|| Error::UnexpectedShape("movement data without `values`".to_owned()))?;
    if values.is_empty() {
        return Err(QueryError::EmptyDataset.into());
    }
    Ok(MovementData { descriptor: response.descriptor, values })
}
