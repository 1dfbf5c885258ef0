//! Mock portal shared by the tests.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use mockito::{Matcher, Mock, Server, ServerGuard};
use reqwest::Url;
use serde_json::{Value, json};

use crate::{
    ApiKeySource,
    ClientOptions,
    Credentials,
    Endpoints,
    LastPoint,
    Result,
    SeriesId,
    SeriesMetadata,
    Smartmeter,
    StatisticPoint,
    StatisticsStore,
};

pub const ACCESS_TOKEN: &str = "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9.access";
pub const AUTH_CODE: &str = "41ad2218-cb9c-4a1b-8e9c-1c9e6f1a0d0e.b2b7.4c21";
pub const B2C_API_KEY: &str = "afb0be74-6455-44f5-a34d-6994223020ba";
pub const B2B_API_KEY: &str = "93d5d520-7cc8-11eb-99bc-ba811041b5f6";
pub const CUSTOMER_ID: &str = "1100034701";
pub const METERING_POINT: &str = "AT0010000000000000001000004392265";

pub struct Backend {
    pub server: ServerGuard,
}

impl Backend {
    pub async fn start() -> Self {
        Self { server: Server::new_async().await }
    }

    fn url(&self, path: &str) -> Url {
        Url::parse(&format!("{}{path}", self.server.url())).unwrap()
    }

    pub fn endpoints(&self) -> Endpoints {
        Endpoints::builder()
            .auth(self.url("/auth/"))
            .app_config(self.url("/assets/app-config.json"))
            .page(self.url("/"))
            .b2c_api(self.url("/gateway/B2C/1.0/"))
            .b2b_api(self.url("/gateway/B2B/1.0/"))
            .service_api(self.url("/sm/api/"))
            .build()
    }

    pub fn smartmeter(&self) -> Smartmeter {
        self.smartmeter_with_key_source(ApiKeySource::AppConfig)
    }

    pub fn smartmeter_with_key_source(&self, api_key_source: ApiKeySource) -> Smartmeter {
        let options = ClientOptions::builder()
            .endpoints(self.endpoints())
            .api_key_source(api_key_source)
            .build();
        Smartmeter::with_options("user@example.com", "hunter2", options).unwrap()
    }

    /// Client with a valid session, skipping the login flow.
    pub fn logged_in(&self) -> Smartmeter {
        let mut smartmeter = self.smartmeter();
        let now = Utc::now();
        smartmeter.credentials = Some(Credentials {
            access_token: ACCESS_TOKEN.to_owned(),
            refresh_token: "refresh".to_owned(),
            access_expires_at: now + TimeDelta::minutes(5),
            refresh_expires_at: now + TimeDelta::minutes(30),
            b2c_api_key: B2C_API_KEY.to_owned(),
            b2b_api_key: B2B_API_KEY.to_owned(),
        });
        smartmeter
    }

    pub fn login_page(&self) -> String {
        format!(
            r#"<html><body><form id="kc-form-login" action="{}" method="post">
                <input name="username"/>
            </form></body></html>"#,
            self.url("/login-actions/authenticate"),
        )
    }

    pub async fn mock_auth_page(&mut self) -> Mock {
        let body = self.login_page();
        self.server
            .mock("GET", "/auth/auth")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(body)
            .expect(1)
            .create_async()
            .await
    }

    /// The username stage answers with the password form.
    pub async fn mock_username_form(&mut self) -> Mock {
        let body = format!(
            r#"<html><body><form id="kc-form-login" action="{}" method="post">
                <input name="password" type="password"/>
            </form></body></html>"#,
            self.url("/login-actions/password"),
        );
        self.server
            .mock("POST", "/login-actions/authenticate")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("username".into(), "user@example.com".into()),
                Matcher::UrlEncoded("login".into(), " ".into()),
            ]))
            .with_status(200)
            .with_body(body)
            .expect(1)
            .create_async()
            .await
    }

    pub async fn mock_password(&mut self) -> Mock {
        let location =
            format!("https://smartmeter-web.wienernetze.at/#state=cb142d1b&code={AUTH_CODE}");
        self.server
            .mock("POST", "/login-actions/password")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("username".into(), "user@example.com".into()),
                Matcher::UrlEncoded("password".into(), "hunter2".into()),
            ]))
            .with_status(302)
            .with_header("Location", &location)
            .expect(1)
            .create_async()
            .await
    }

    /// Everything up to the password stage.
    pub async fn mock_login_forms(&mut self) -> Vec<Mock> {
        vec![self.mock_auth_page().await, self.mock_username_form().await]
    }

    /// Everything up to the token exchange.
    pub async fn mock_login_pages(&mut self) -> Vec<Mock> {
        let mut mocks = self.mock_login_forms().await;
        mocks.push(self.mock_password().await);
        mocks
    }

    pub async fn mock_token(&mut self) -> Mock {
        self.server
            .mock("POST", "/auth/token")
            .with_status(200)
            .with_body(token_response("Bearer", 300))
            .expect(1)
            .create_async()
            .await
    }

    pub async fn mock_app_config(&mut self, body: &str) -> Mock {
        self.server
            .mock("GET", "/assets/app-config.json")
            .match_header("Authorization", format!("Bearer {ACCESS_TOKEN}").as_str())
            .with_status(200)
            .with_body(body)
            .create_async()
            .await
    }

    /// The complete login flow, each step expected exactly once.
    pub async fn mock_login(&mut self) -> Vec<Mock> {
        let mut mocks = self.mock_login_pages().await;
        mocks.push(self.mock_token().await);
        let config = self.mock_app_config(&app_config_body()).await;
        mocks.push(config);
        mocks
    }

    /// Metering point listing with a single consuming metering point.
    pub async fn mock_metering_points(&mut self) -> Mock {
        self.server
            .mock("GET", "/gateway/B2C/1.0/zaehlpunkte")
            .with_status(200)
            .with_body(metering_points_body(true).to_string())
            .create_async()
            .await
    }
}

pub fn token_response(token_type: &str, expires_in: i64) -> String {
    json!({
        "access_token": ACCESS_TOKEN,
        "expires_in": expires_in,
        "refresh_expires_in": 1800,
        "refresh_token": "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9.refresh",
        "token_type": token_type,
        "not-before-policy": 0,
        "session_state": "949e0f0d-4fbe-4d4f-9a3f-e8d2e4a2c1c9",
        "scope": "openid email profile",
    })
    .to_string()
}

pub fn app_config_body() -> String {
    json!({ "b2cApiKey": B2C_API_KEY, "b2bApiKey": B2B_API_KEY }).to_string()
}

pub fn metering_points_body(is_active: bool) -> Value {
    json!([
        {
            "bezeichnung": "Max Mustermann",
            "geschaeftspartner": CUSTOMER_ID,
            "zaehlpunkte": [
                {
                    "zaehlpunktnummer": METERING_POINT,
                    "customLabel": "Wohnung",
                    "equipmentNumber": "1234567890",
                    "geraetNumber": "ABC1234567890",
                    "isSmartMeterMarketReady": is_active,
                    "isActive": is_active,
                    "anlage": { "typ": "TAGSTROM" },
                    "idexStatus": { "granularity": { "status": "QUARTER_HOUR" } },
                    "verbrauchsstelle": {
                        "strasse": "Musterstraße",
                        "hausnummer": "1",
                        "anlagenadresse": "Musterstraße 1/2/3",
                        "postleitzahl": "1010",
                        "ort": "Wien",
                        "laengengrad": "16.3738",
                        "breitengrad": "48.2082",
                    },
                },
                {
                    "zaehlpunktnummer": "AT0010000000000000001000009999999",
                    "customLabel": "PV",
                    "isActive": true,
                    "anlage": { "typ": "BEZUG" },
                },
            ],
        },
    ])
}

/// Quarter-hourly movement data body.
pub fn movement_body(
    metering_point: &str,
    unit: &str,
    start: DateTime<Utc>,
    values: &[Option<f64>],
) -> Value {
    let values: Vec<_> = values
        .iter()
        .enumerate()
        .map(|(i, value)| {
            let from = start + TimeDelta::minutes(15 * i64::try_from(i).unwrap());
            json!({
                "wert": value,
                "zeitpunktVon": from.to_rfc3339(),
                "zeitpunktBis": (from + TimeDelta::minutes(15)).to_rfc3339(),
                "geschaetzt": false,
            })
        })
        .collect();
    json!({
        "descriptor": {
            "geschaeftspartnernummer": CUSTOMER_ID,
            "zaehlpunktnummer": metering_point,
            "rolle": "V002",
            "aggregat": "NONE",
            "granularitaet": "QH",
            "einheit": unit,
        },
        "values": values,
    })
}

#[derive(Default)]
pub struct MemoryStore {
    points: Mutex<Vec<StatisticPoint>>,
    metadata: Mutex<Option<SeriesMetadata>>,
    n_batches: Mutex<usize>,
}

impl MemoryStore {
    pub fn with_points(points: Vec<StatisticPoint>) -> Self {
        Self { points: Mutex::new(points), ..Self::default() }
    }

    pub fn points(&self) -> Vec<StatisticPoint> {
        self.points.lock().unwrap().clone()
    }

    pub fn metadata(&self) -> Option<SeriesMetadata> {
        self.metadata.lock().unwrap().clone()
    }

    pub fn n_batches(&self) -> usize {
        *self.n_batches.lock().unwrap()
    }
}

#[async_trait]
impl StatisticsStore for MemoryStore {
    async fn last_point(&self, _series_id: &SeriesId) -> Result<Option<LastPoint>> {
        Ok(self.points.lock().unwrap().last().map(LastPoint::from))
    }

    async fn append_points(&self, metadata: &SeriesMetadata, points: &[StatisticPoint]) -> Result {
        let mut stored = self.points.lock().unwrap();
        if let Some(last) = stored.last() {
            assert!(points.iter().all(|point| point.start >= last.end() && point.sum >= last.sum));
        }
        stored.extend_from_slice(points);
        *self.metadata.lock().unwrap() = Some(metadata.clone());
        *self.n_batches.lock().unwrap() += 1;
        Ok(())
    }
}
