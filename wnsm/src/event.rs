use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use serde_with::serde_as;

use crate::{
    client::Smartmeter,
    prelude::*,
    timestamp::{self, PortalTimestamp},
};

/// User-defined event, annotating the consumption charts of the portal.
#[serde_as]
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde_as(as = "Option<PortalTimestamp>")]
    pub end_at: Option<DateTime<Utc>>,

    pub name: String,

    #[serde_as(as = "PortalTimestamp")]
    pub start_at: DateTime<Utc>,

    #[serde(rename = "typ")]
    pub kind: EventKind,

    #[serde(rename = "zaehlpunkt")]
    pub metering_point: String,
}

impl Event {
    /// A point in time when `end_at` is missing, a time span otherwise.
    pub fn new(
        metering_point: impl Into<String>,
        name: impl Into<String>,
        start_at: DateTime<Utc>,
        end_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            kind: if end_at.is_some() { EventKind::TimeSpan } else { EventKind::PointInTime },
            end_at,
            name: name.into(),
            start_at,
            metering_point: metering_point.into(),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub enum EventKind {
    #[serde(rename = "ZEITPUNKT")]
    PointInTime,

    #[serde(rename = "ZEITSPANNE")]
    TimeSpan,
}

impl Smartmeter {
    /// Profile of the logged-in user.
    pub async fn profile(&self) -> Result<Value> {
        self.request(&self.endpoints.service_api, "user/profile", Method::GET, &[], None).await
    }

    /// Events of the metering point, `until` defaults to now.
    pub async fn events(
        &self,
        metering_point: Option<&str>,
        from: DateTime<Utc>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Value> {
        let metering_point = self.resolve(metering_point).await?;
        let query = [
            ("zaehlpunkt", metering_point.id().to_owned()),
            ("dateFrom", timestamp::format(&from)),
            ("dateUntil", timestamp::format(&until.unwrap_or_else(Utc::now))),
        ];
        self.request(&self.endpoints.service_api, "user/ereignisse", Method::GET, &query, None)
            .await
    }

    #[instrument(skip_all, fields(metering_point = %event.metering_point, name = %event.name))]
    pub async fn create_event(&self, event: &Event) -> Result<Value> {
        info!("creating…");
        let body = serde_json::to_value(event).map_err(|error| {
            Error::UnexpectedShape(format!("could not serialize the event: {error}"))
        })?;
        self.request(&self.endpoints.b2c_api, "user/ereignis", Method::POST, &[], Some(&body)).await
    }

    #[instrument(skip_all, fields(id = id))]
    pub async fn delete_event(&self, id: &str) -> Result {
        info!("deleting…");
        let endpoint = format!("user/ereignis/{id}");
        let _: Value =
            self.request(&self.endpoints.b2c_api, &endpoint, Method::DELETE, &[], None).await?;
        Ok(())
    }
}
