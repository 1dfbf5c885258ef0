mod pkce;
mod scrape;

use std::fmt::{self, Debug, Formatter};

use chrono::{DateTime, TimeDelta, Utc};
use reqwest::{StatusCode, Url, header::LOCATION};
use serde::Deserialize;

use self::pkce::Pkce;
use crate::{client::Smartmeter, endpoints::CLIENT_ID, prelude::*};

/// Where the gateway API keys are looked up after the token exchange.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ApiKeySource {
    /// The front-end `app-config.json`, which also advertises the gateway base URLs.
    #[default]
    AppConfig,

    /// Scan the application's main JavaScript bundle.
    Bundle,
}

/// Session state obtained by [`Smartmeter::login`].
#[derive(Clone)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
    pub b2c_api_key: String,
    pub b2b_api_key: String,
}

impl Credentials {
    pub fn is_access_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.access_expires_at
    }
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_expires_at", &self.access_expires_at)
            .field("refresh_expires_at", &self.refresh_expires_at)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    refresh_expires_in: i64,
    token_type: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppConfig {
    b2c_api_key: Option<String>,
    b2b_api_key: Option<String>,
    b2c_api_url: Option<String>,
    b2b_api_url: Option<String>,
}

struct ApiKeys {
    b2c: String,
    b2b: String,
}

const CHECK_CREDENTIALS: &str = "Login failed. Check username/password.";
const NO_CODE: &str = "Login failed. Could not extract 'code' from 'Location'";

impl Smartmeter {
    /// Walk the login flow unless the current access token is still valid.
    ///
    /// An expired session is discarded and replaced by a fresh one.
    #[instrument(skip_all, fields(username = %self.username))]
    pub async fn login(&mut self) -> Result {
        if let Some(credentials) = &self.credentials {
            if !credentials.is_access_expired(Utc::now()) {
                debug!("already logged in");
                return Ok(());
            }
            info!("access token has expired, logging in again…");
            self.reset();
        }

        let pkce = Pkce::generate();
        let action = self.load_login_page(&pkce).await?;
        let action = self.submit_username(action).await?;
        let code = self.submit_password(&action).await?;
        let tokens = self.exchange_code(&code, &pkce).await?;

        let now = Utc::now();
        let access_expires_at = now + TimeDelta::seconds(tokens.expires_in);
        let refresh_expires_at = now + TimeDelta::seconds(tokens.refresh_expires_in);
        if now >= access_expires_at {
            return Err(Error::AccessTokenExpired);
        }

        let api_keys = match self.options.api_key_source {
            ApiKeySource::AppConfig => self.load_app_config(&tokens.access_token).await?,
            ApiKeySource::Bundle => self.crawl_bundle(&tokens.access_token).await?,
        };

        info!(%access_expires_at, "logged in");
        self.credentials = Some(Credentials {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            access_expires_at,
            refresh_expires_at,
            b2c_api_key: api_keys.b2c,
            b2b_api_key: api_keys.b2b,
        });
        Ok(())
    }

    /// Forget the session, the next [`Smartmeter::login`] starts from scratch.
    pub fn reset(&mut self) {
        self.credentials = None;
    }

    /// Load the authorization page and return the login form action.
    async fn load_login_page(&self, pkce: &Pkce) -> Result<Url> {
        debug!("loading the login page…");
        let mut url = join(&self.endpoints.auth, "auth")?;
        url.query_pairs_mut()
            .extend_pairs(self.endpoints.login_args())
            .append_pair("code_challenge", &pkce.challenge)
            .append_pair("code_challenge_method", Pkce::METHOD);
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(Error::transport("could not load the login page"))?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(Error::connection(format!("could not load the login page: {status}")));
        }
        let base = response.url().clone();
        let html =
            response.text().await.map_err(Error::transport("could not read the login page"))?;
        let action = scrape::find_form_action(&html)
            .ok_or_else(|| Error::Login("could not find the login form".to_owned()))?;
        join(&base, &action)
    }

    /// First stage of the two-stage form: the username alone.
    ///
    /// Returns the action of the password form if the response carries one.
    async fn submit_username(&self, action: Url) -> Result<Url> {
        debug!("submitting the username…");
        let response = self
            .http_no_redirect
            .post(action.clone())
            .form(&[("username", self.username.as_str()), ("login", " ")])
            .send()
            .await
            .map_err(Error::transport("could not submit the username"))?;
        let base = response.url().clone();
        let html =
            response.text().await.map_err(Error::transport("could not read the login form"))?;
        match scrape::find_form_action(&html) {
            Some(next) => join(&base, &next),
            None => Ok(action),
        }
    }

    /// Second stage: submit the password and extract the authorization code from the redirect.
    async fn submit_password(&self, action: &Url) -> Result<String> {
        debug!("submitting the password…");
        let response = self
            .http_no_redirect
            .post(action.clone())
            .form(&[("username", self.username.as_str()), ("password", self.password.as_str())])
            .send()
            .await
            .map_err(Error::transport("could not submit the password"))?;
        let location = response
            .headers()
            .get(LOCATION)
            .ok_or_else(|| Error::Login(CHECK_CREDENTIALS.to_owned()))?
            .to_str()
            .map_err(|_| Error::Login(NO_CODE.to_owned()))?;
        let location = action.join(location).map_err(|_| Error::Login(NO_CODE.to_owned()))?;
        location
            .fragment()
            .and_then(extract_code)
            .ok_or_else(|| Error::Login(NO_CODE.to_owned()))
    }

    async fn exchange_code(&self, code: &str, pkce: &Pkce) -> Result<TokenResponse> {
        debug!("exchanging the authorization code…");
        let redirect_uri = self.endpoints.redirect_uri.to_string();
        let response = self
            .http
            .post(join(&self.endpoints.auth, "token")?)
            .form(&[
                ("grant_type", "authorization_code"),
                ("client_id", CLIENT_ID),
                ("redirect_uri", redirect_uri.as_str()),
                ("code", code),
                ("code_verifier", pkce.verifier.as_str()),
            ])
            .send()
            .await
            .map_err(Error::transport("could not obtain the access token"))?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(Error::connection(format!("could not obtain the access token: {status}")));
        }
        let tokens: TokenResponse =
            response.json().await.map_err(Error::transport("could not parse the token response"))?;
        if tokens.token_type != "Bearer" {
            return Err(Error::Login(format!(
                "Bearer token required, but got {:?}",
                tokens.token_type
            )));
        }
        Ok(tokens)
    }

    /// Read the gateway API keys from the front-end configuration.
    ///
    /// Also adopts the gateway base URLs if the backend has moved them.
    async fn load_app_config(&mut self, access_token: &str) -> Result<ApiKeys> {
        debug!("loading the application configuration…");
        let config: AppConfig = self
            .http
            .get(self.endpoints.app_config.clone())
            .bearer_auth(access_token)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(Error::transport("could not obtain the API keys"))?
            .json()
            .await
            .map_err(Error::transport("could not parse the application configuration"))?;
        let api_keys = ApiKeys {
            b2c: config.b2c_api_key.ok_or_else(|| missing_key("b2cApiKey"))?,
            b2b: config.b2b_api_key.ok_or_else(|| missing_key("b2bApiKey"))?,
        };
        self.migrate_base_urls(config.b2c_api_url.as_deref(), config.b2b_api_url.as_deref());
        Ok(api_keys)
    }

    /// Locate the main bundle on the application page and scan it for the API keys.
    async fn crawl_bundle(&mut self, access_token: &str) -> Result<ApiKeys> {
        debug!("crawling the application bundle…");
        let html = self.get_text(self.endpoints.page.clone(), access_token).await?;
        let bundle = scrape::script_sources(&html)
            .into_iter()
            .find(|src| scrape::is_main_bundle(src))
            .ok_or_else(|| Error::connection("main bundle not found in the application page"))?;
        let bundle = join(&self.endpoints.page, &bundle)?;
        let source = self.get_text(bundle, access_token).await?;
        let find_api_key = |key: &str| {
            scrape::find_key(&source, key).map(str::to_owned).ok_or_else(|| missing_key(key))
        };
        let api_keys = ApiKeys { b2c: find_api_key("b2cApiKey")?, b2b: find_api_key("b2bApiKey")? };
        self.migrate_base_urls(
            scrape::find_key(&source, "b2cApiUrl"),
            scrape::find_key(&source, "b2bApiUrl"),
        );
        Ok(api_keys)
    }

    async fn get_text(&self, url: Url, access_token: &str) -> Result<String> {
        self.http
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(Error::transport("could not obtain the API keys"))?
            .text()
            .await
            .map_err(Error::transport("could not read the application bundle"))
    }

    fn migrate_base_urls(&mut self, b2c_api: Option<&str>, b2b_api: Option<&str>) {
        if let Some(url) = b2c_api.and_then(|url| parse_advertised_url("b2cApiUrl", url)) {
            self.endpoints.migrate_b2c_api(url);
        }
        if let Some(url) = b2b_api.and_then(|url| parse_advertised_url("b2bApiUrl", url)) {
            self.endpoints.migrate_b2b_api(url);
        }
    }
}

fn parse_advertised_url(key: &str, url: &str) -> Option<Url> {
    Url::parse(url)
        .inspect_err(|error| warn!(key, url, ?error, "ignoring an invalid base URL"))
        .ok()
}

fn missing_key(key: &str) -> Error {
    Error::connection(format!("{key} not found in response!"))
}

fn join(base: &Url, path: &str) -> Result<Url> {
    base.join(path).map_err(|error| Error::connection(format!("invalid URL `{path}`: {error}")))
}

/// Pick `code` out of the redirect fragment.
///
/// Only `key=value` pairs with exactly one `=` count.
fn extract_code(fragment: &str) -> Option<String> {
    fragment
        .split('&')
        .filter_map(|pair| {
            let mut parts = pair.split('=');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(key), Some(value), None) => Some((key, value)),
                _ => None,
            }
        })
        .find(|(key, _)| *key == "code")
        .map(|(_, value)| value.to_owned())
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;

    use super::*;
    use crate::testing::{self, Backend};

    #[test]
    fn test_extract_code() {
        assert_eq!(
            extract_code("state=cb142d1b&session_state=949e0f0d&code=41ad2218.4c21").as_deref(),
            Some("41ad2218.4c21"),
        );
        assert_eq!(extract_code("code=abc#state=cb142d1b&session_state=949e0f0d"), None);
        assert_eq!(extract_code("code=a=b"), None);
        assert_eq!(extract_code(""), None);
    }

    #[tokio::test]
    async fn test_login_ok() -> Result {
        let mut backend = Backend::start().await;
        let mocks = backend.mock_login().await;
        let mut smartmeter = backend.smartmeter();
        smartmeter.login().await?;
        for mock in mocks {
            mock.assert_async().await;
        }
        let credentials = smartmeter.credentials.as_ref().unwrap();
        assert_eq!(credentials.access_token, testing::ACCESS_TOKEN);
        assert_eq!(credentials.b2c_api_key, testing::B2C_API_KEY);
        assert_eq!(credentials.b2b_api_key, testing::B2B_API_KEY);
        assert!(credentials.access_expires_at > Utc::now());
        Ok(())
    }

    #[tokio::test]
    async fn test_login_sends_pkce_challenge() -> Result {
        let mut backend = Backend::start().await;
        backend.mock_username_form().await;
        backend.mock_password().await;
        backend.mock_app_config(&testing::app_config_body()).await;
        let auth = backend
            .server
            .mock("GET", "/auth/auth")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("client_id".into(), "wn-smartmeter".into()),
                Matcher::UrlEncoded("response_mode".into(), "fragment".into()),
                Matcher::UrlEncoded("code_challenge_method".into(), "S256".into()),
                Matcher::Regex("code_challenge=[A-Za-z0-9_-]{43}".into()),
            ]))
            .with_status(200)
            .with_body(backend.login_page())
            .expect(1)
            .create_async()
            .await;
        let token = backend
            .server
            .mock("POST", "/auth/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
                Matcher::UrlEncoded("code".into(), testing::AUTH_CODE.into()),
                Matcher::Regex("code_verifier=[A-Za-z0-9]{64}".into()),
            ]))
            .with_status(200)
            .with_body(testing::token_response("Bearer", 300))
            .expect(1)
            .create_async()
            .await;
        backend.smartmeter().login().await?;
        auth.assert_async().await;
        token.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_login_is_idempotent() -> Result {
        let mut backend = Backend::start().await;
        let mocks = backend.mock_login().await;
        let mut smartmeter = backend.smartmeter();
        smartmeter.login().await?;
        smartmeter.login().await?;
        for mock in mocks {
            mock.assert_async().await;
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_login_expired_session_logs_in_again() -> Result {
        let mut backend = Backend::start().await;
        let token = backend
            .server
            .mock("POST", "/auth/token")
            .with_status(200)
            .with_body(testing::token_response("Bearer", 300))
            .expect(2)
            .create_async()
            .await;
        backend.mock_login_pages().await;
        backend.mock_app_config(&testing::app_config_body()).await;
        let mut smartmeter = backend.smartmeter();
        smartmeter.login().await?;
        smartmeter.credentials.as_mut().unwrap().access_expires_at =
            Utc::now() - TimeDelta::seconds(1);
        smartmeter.login().await?;
        token.assert_async().await;
        assert!(!smartmeter.credentials.as_ref().unwrap().is_access_expired(Utc::now()));
        Ok(())
    }

    #[tokio::test]
    async fn test_login_without_location_fails() {
        let mut backend = Backend::start().await;
        backend.mock_login_forms().await;
        backend
            .server
            .mock("POST", "/login-actions/password")
            .with_status(200)
            .create_async()
            .await;
        let error = backend.smartmeter().login().await.unwrap_err();
        assert!(matches!(error, Error::Login(message) if message == CHECK_CREDENTIALS));
    }

    #[tokio::test]
    async fn test_login_redirect_without_code_fails() {
        let mut backend = Backend::start().await;
        backend.mock_login_forms().await;
        backend
            .server
            .mock("POST", "/login-actions/password")
            .with_status(302)
            .with_header("Location", "https://smartmeter-web.wienernetze.at/not-found")
            .create_async()
            .await;
        let error = backend.smartmeter().login().await.unwrap_err();
        assert!(matches!(error, Error::Login(message) if message == NO_CODE));
    }

    #[tokio::test]
    async fn test_login_rejects_other_token_types() {
        let mut backend = Backend::start().await;
        backend.mock_login_pages().await;
        backend
            .server
            .mock("POST", "/auth/token")
            .with_status(200)
            .with_body(testing::token_response("Mac", 300))
            .create_async()
            .await;
        let error = backend.smartmeter().login().await.unwrap_err();
        assert!(matches!(
            error,
            Error::Login(message) if message == r#"Bearer token required, but got "Mac""#
        ));
    }

    #[tokio::test]
    async fn test_login_token_endpoint_failure() {
        let mut backend = Backend::start().await;
        backend.mock_login_pages().await;
        backend.server.mock("POST", "/auth/token").with_status(500).create_async().await;
        let error = backend.smartmeter().login().await.unwrap_err();
        assert!(matches!(error, Error::Connection { .. }));
    }

    #[tokio::test]
    async fn test_login_missing_api_key() {
        let mut backend = Backend::start().await;
        backend.mock_login_pages().await;
        backend.mock_token().await;
        backend.mock_app_config(&serde_json::json!({ "b2cApiKey": "b2c" }).to_string()).await;
        let mut smartmeter = backend.smartmeter();
        let error = smartmeter.login().await.unwrap_err();
        assert_eq!(error.to_string(), "b2bApiKey not found in response!");
        assert!(smartmeter.credentials.is_none());
    }

    #[tokio::test]
    async fn test_login_adopts_changed_base_url() -> Result {
        let mut backend = Backend::start().await;
        backend.mock_login_pages().await;
        backend.mock_token().await;
        let moved = format!("{}/gateway/B2B/2.0", backend.server.url());
        let config = serde_json::json!({
            "b2cApiKey": testing::B2C_API_KEY,
            "b2bApiKey": testing::B2B_API_KEY,
            "b2cApiUrl": backend.endpoints().b2c_api.as_str(),
            "b2bApiUrl": moved,
        });
        backend.mock_app_config(&config.to_string()).await;
        let mut smartmeter = backend.smartmeter();
        smartmeter.login().await?;
        assert_eq!(smartmeter.endpoints.b2b_api.as_str(), format!("{moved}/"));
        assert_eq!(smartmeter.endpoints.b2c_api, backend.endpoints().b2c_api);
        Ok(())
    }

    #[tokio::test]
    async fn test_login_with_bundle_keys() -> Result {
        let mut backend = Backend::start().await;
        backend.mock_login_pages().await;
        backend.mock_token().await;
        let page = backend
            .server
            .mock("GET", "/")
            .with_status(200)
            .with_body(r#"<html><head><script src="main.5f2c9a.js"></script></head></html>"#)
            .create_async()
            .await;
        let bundle = backend
            .server
            .mock("GET", "/main.5f2c9a.js")
            .with_status(200)
            .with_body(format!(
                r#"const e={{b2cApiKey:"{}",b2bApiKey:"{}"}};"#,
                testing::B2C_API_KEY,
                testing::B2B_API_KEY,
            ))
            .create_async()
            .await;
        let mut smartmeter = backend.smartmeter_with_key_source(ApiKeySource::Bundle);
        smartmeter.login().await?;
        page.assert_async().await;
        bundle.assert_async().await;
        assert_eq!(smartmeter.credentials.as_ref().unwrap().b2b_api_key, testing::B2B_API_KEY);
        Ok(())
    }
}
