use std::{sync::Arc, time::Duration};

use bon::Builder;
use chrono::Utc;
use reqwest::{Method, Url, cookie::Jar, header::ACCEPT, redirect::Policy};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    auth::{ApiKeySource, Credentials},
    endpoints::{Endpoints, normalize},
    prelude::*,
};

const GATEWAY_API_KEY: &str = "X-Gateway-APIKey";

#[must_use]
#[derive(Clone, Debug, Builder)]
pub struct ClientOptions {
    /// Timeout of every single HTTP request.
    #[builder(default = Duration::from_secs(30))]
    pub timeout: Duration,

    #[builder(default)]
    pub api_key_source: ApiKeySource,

    #[builder(default)]
    pub endpoints: Endpoints,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Authenticated session with the smart meter portal.
///
/// Calls that mutate the session take `&mut self`, so a login cannot race with itself.
pub struct Smartmeter {
    /// Follows redirects, used for the pages and the APIs.
    pub(crate) http: reqwest::Client,

    /// Shares the cookie jar with [`Self::http`] but keeps redirects to itself,
    /// so that the authorization code can be read from `Location`.
    pub(crate) http_no_redirect: reqwest::Client,

    pub(crate) endpoints: Endpoints,
    pub(crate) options: ClientOptions,
    pub(crate) username: String,
    pub(crate) password: String,
    pub(crate) credentials: Option<Credentials>,
}

impl Smartmeter {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Result<Self> {
        Self::with_options(username, password, ClientOptions::default())
    }

    pub fn with_options(
        username: impl Into<String>,
        password: impl Into<String>,
        options: ClientOptions,
    ) -> Result<Self> {
        let jar = Arc::new(Jar::default());
        let http = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .timeout(options.timeout)
            .build()
            .map_err(Error::transport("could not build the HTTP client"))?;
        let http_no_redirect = reqwest::Client::builder()
            .cookie_provider(jar)
            .redirect(Policy::none())
            .timeout(options.timeout)
            .build()
            .map_err(Error::transport("could not build the HTTP client"))?;
        Ok(Self {
            http,
            http_no_redirect,
            endpoints: options.endpoints.clone().normalized(),
            options,
            username: username.into(),
            password: password.into(),
            credentials: None,
        })
    }

    /// Current session, if logged in.
    pub const fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Effective base URLs, including those adopted from the application configuration.
    pub const fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Call an authenticated endpoint relative to one of the API base URLs.
    ///
    /// The gateway API key is attached when `base_url` is the B2C or the B2B gateway.
    /// A response carrying an `Exception` member fails with [`Error::Backend`].
    #[instrument(skip_all, fields(endpoint = endpoint, method = %method))]
    pub async fn request<R: DeserializeOwned>(
        &self,
        base_url: &Url,
        endpoint: &str,
        method: Method,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<R> {
        let credentials = self.credentials.as_ref().ok_or(Error::NotLoggedIn)?;
        if credentials.is_access_expired(Utc::now()) {
            return Err(Error::AccessTokenExpired);
        }

        let base_url = normalize(base_url.clone());
        let url = base_url
            .join(endpoint)
            .map_err(|error| Error::connection(format!("invalid endpoint `{endpoint}`: {error}")))?;
        debug!(%url, "fetching…");

        let mut request = self
            .http
            .request(method, url)
            .bearer_auth(&credentials.access_token)
            .header(ACCEPT, "application/json")
            .query(query);
        if let Some(api_key) = self.gateway_api_key(&base_url, credentials) {
            request = request.header(GATEWAY_API_KEY, api_key);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(Error::transport(format!("could not call `{endpoint}`")))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(Error::transport(format!("could not read the response of `{endpoint}`")))?;
        trace!(%status, text, "received");

        let value = if text.trim().is_empty() {
            Value::Null
        } else {
            match serde_json::from_str(&text) {
                Ok(value) => value,
                Err(_) if !status.is_success() => {
                    return Err(Error::connection(format!("`{endpoint}` failed with {status}")));
                }
                Err(error) => {
                    return Err(Error::UnexpectedShape(format!("`{endpoint}`: {error}")));
                }
            }
        };
        match Payload::from(value) {
            Payload::Exception(exception) => {
                Err(Error::Backend { endpoint: endpoint.to_owned(), exception })
            }
            Payload::Data(_) if !status.is_success() => {
                Err(Error::connection(format!("`{endpoint}` failed with {status}")))
            }
            Payload::Data(value) => serde_json::from_value(value)
                .map_err(|error| Error::UnexpectedShape(format!("`{endpoint}`: {error}"))),
        }
    }

    fn gateway_api_key<'a>(&self, base_url: &Url, credentials: &'a Credentials) -> Option<&'a str> {
        if *base_url == self.endpoints.b2c_api {
            Some(&credentials.b2c_api_key)
        } else if *base_url == self.endpoints.b2b_api {
            Some(&credentials.b2b_api_key)
        } else {
            None
        }
    }
}

/// Response envelope: the portal reports failures as an object with an `Exception` member.
enum Payload {
    Data(Value),
    Exception(Value),
}

impl From<Value> for Payload {
    fn from(mut value: Value) -> Self {
        match value.as_object_mut().and_then(|object| object.remove("Exception")) {
            Some(exception) => Self::Exception(exception),
            None => Self::Data(value),
        }
    }
}
