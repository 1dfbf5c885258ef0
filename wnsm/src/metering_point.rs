use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::{client::Smartmeter, prelude::*};

/// Business partner record of the listing, owning its metering points.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Contract {
    #[serde(rename = "geschaeftspartner")]
    pub customer_id: String,

    #[serde(rename = "bezeichnung", default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(rename = "zaehlpunkte", default)]
    pub metering_points: Vec<MeteringPoint>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeteringPoint {
    #[serde(rename = "zaehlpunktnummer")]
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_label: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equipment_number: Option<String>,

    #[serde(rename = "geraetNumber", default, skip_serializing_if = "Option::is_none")]
    pub device_number: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_smart_meter_market_ready: Option<bool>,

    #[serde(rename = "anlage", default, skip_serializing_if = "Option::is_none")]
    pub installation: Option<Installation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idex_status: Option<IdexStatus>,

    #[serde(rename = "verbrauchsstelle", default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Installation {
    #[serde(rename = "typ", default)]
    pub kind: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct IdexStatus {
    #[serde(default)]
    pub granularity: Option<GranularityStatus>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GranularityStatus {
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(rename = "strasse", default)]
    pub street: Option<String>,

    #[serde(rename = "hausnummer", default)]
    pub house_number: Option<String>,

    #[serde(rename = "anlagenadresse", default)]
    pub full_address: Option<String>,

    #[serde(rename = "postleitzahl", default)]
    pub postal_code: Option<String>,

    #[serde(rename = "ort", default)]
    pub city: Option<String>,

    #[serde(rename = "laengengrad", default)]
    pub longitude: Option<String>,

    #[serde(rename = "breitengrad", default)]
    pub latitude: Option<String>,
}

impl MeteringPoint {
    /// A metering point is active unless both flags are explicitly `false`.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_active.unwrap_or(true) || self.is_smart_meter_market_ready.unwrap_or(true)
    }

    /// Granularity the metering point is configured for, `QUARTER_HOUR` or `DAY`.
    #[must_use]
    pub fn granularity(&self) -> Option<&str> {
        self.idex_status.as_ref()?.granularity.as_ref()?.status.as_deref()
    }

    pub fn installation_type(&self) -> Result<InstallationType> {
        let kind = self.installation.as_ref().and_then(|installation| installation.kind.as_deref());
        kind.unwrap_or_default().parse()
    }

    /// Human-readable name: the custom label if set.
    #[must_use]
    pub fn name(&self) -> &str {
        self.custom_label.as_deref().filter(|label| !label.is_empty()).unwrap_or(&self.id)
    }
}

/// Energy direction of the installation behind a metering point.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub enum InstallationType {
    Consuming,
    Feeding,
}

impl std::str::FromStr for InstallationType {
    type Err = Error;

    fn from_str(kind: &str) -> Result<Self> {
        match kind {
            "TAGSTROM" | "WAERMEPUMPE" | "STROM" => Ok(Self::Consuming),
            "BEZUG" => Ok(Self::Feeding),
            _ => Err(Error::UnsupportedInstallationType(kind.to_owned())),
        }
    }
}

/// Metering point resolved together with its owning customer.
#[derive(Clone, Debug)]
pub struct ResolvedMeteringPoint {
    pub customer_id: String,
    pub point: MeteringPoint,
}

impl ResolvedMeteringPoint {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.point.id
    }

    pub fn installation_type(&self) -> Result<InstallationType> {
        self.point.installation_type()
    }
}

impl Smartmeter {
    /// List the contracts of the logged-in user together with their metering points.
    #[instrument(skip_all)]
    pub async fn metering_points(&self) -> Result<Vec<Contract>> {
        self.request(&self.endpoints.b2c_api, "zaehlpunkte", Method::GET, &[], None).await
    }

    /// Find the metering point by its ID, or take the first one of the first contract.
    #[instrument(skip_all, fields(metering_point = metering_point))]
    pub async fn resolve(&self, metering_point: Option<&str>) -> Result<ResolvedMeteringPoint> {
        let contracts = self.metering_points().await?;
        let mut candidates = contracts.into_iter().flat_map(|contract| {
            let customer_id = contract.customer_id;
            contract
                .metering_points
                .into_iter()
                .map(move |point| ResolvedMeteringPoint { customer_id: customer_id.clone(), point })
        });
        match metering_point {
            Some(id) => candidates
                .find(|candidate| candidate.id() == id)
                .ok_or_else(|| QueryError::MeteringPointNotFound(id.to_owned()).into()),
            None => candidates.next().ok_or_else(|| QueryError::NoMeteringPoints.into()),
        }
    }
}
