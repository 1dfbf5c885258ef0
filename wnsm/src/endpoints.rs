use bon::Builder;
use reqwest::Url;

use crate::prelude::*;

/// The client identifier registered for the smart meter web application.
pub(crate) const CLIENT_ID: &str = "wn-smartmeter";

const AUTH_URL: &str = "https://log.wien/auth/realms/logwien/protocol/openid-connect/";
const APP_CONFIG_URL: &str = "https://smartmeter-web.wienernetze.at/assets/app-config.json";
const PAGE_URL: &str = "https://smartmeter-web.wienernetze.at/";
const B2C_API_URL: &str = "https://api.wstw.at/gateway/WN_SMART_METER_PORTAL_API_B2C/1.0/";
const B2B_API_URL: &str = "https://api.wstw.at/gateway/WN_SMART_METER_PORTAL_API_B2B/1.0/";
const SERVICE_API_URL: &str = "https://service.wienernetze.at/sm/api/";

/// Base URLs of every service the client talks to.
///
/// The client normalizes the base URLs to end with `/`, so that relative endpoints are
/// appended rather than replacing the last path segment.
#[must_use]
#[derive(Clone, Debug, Eq, PartialEq, Builder)]
pub struct Endpoints {
    /// OpenID Connect realm: `auth` and `token` are resolved against it.
    #[builder(default = default_url(AUTH_URL))]
    pub auth: Url,

    /// Front-end configuration carrying the gateway API keys.
    #[builder(default = default_url(APP_CONFIG_URL))]
    pub app_config: Url,

    /// Web application page, used to locate the main bundle in the legacy key lookup.
    #[builder(default = default_url(PAGE_URL))]
    pub page: Url,

    #[builder(default = default_url(PAGE_URL))]
    pub redirect_uri: Url,

    #[builder(default = default_url(B2C_API_URL))]
    pub b2c_api: Url,

    #[builder(default = default_url(B2B_API_URL))]
    pub b2b_api: Url,

    /// Legacy service API (profile, events, movement data). It requires no gateway key.
    #[builder(default = default_url(SERVICE_API_URL))]
    pub service_api: Url,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Endpoints {
    /// Make every base URL end with `/`.
    pub fn normalized(self) -> Self {
        Self {
            auth: normalize(self.auth),
            app_config: self.app_config,
            page: normalize(self.page),
            redirect_uri: self.redirect_uri,
            b2c_api: normalize(self.b2c_api),
            b2b_api: normalize(self.b2b_api),
            service_api: normalize(self.service_api),
        }
    }

    /// Query parameters of the authorization request, without the PKCE challenge.
    pub(crate) fn login_args(&self) -> [(&'static str, String); 6] {
        [
            ("client_id", CLIENT_ID.to_owned()),
            ("redirect_uri", self.redirect_uri.to_string()),
            ("response_mode", "fragment".to_owned()),
            ("response_type", "code".to_owned()),
            ("scope", "openid".to_owned()),
            ("nonce", String::new()),
        ]
    }

    /// Adopt a B2C base URL advertised by the application configuration.
    pub(crate) fn migrate_b2c_api(&mut self, url: Url) {
        Self::migrate(&mut self.b2c_api, url, "b2cApiUrl");
    }

    /// Adopt a B2B base URL advertised by the application configuration.
    pub(crate) fn migrate_b2b_api(&mut self, url: Url) {
        Self::migrate(&mut self.b2b_api, url, "b2bApiUrl");
    }

    fn migrate(current: &mut Url, url: Url, key: &str) {
        let url = normalize(url);
        if *current != url {
            warn!(key, from = %current, to = %url, "the backend base URL has changed, adopting it");
            *current = url;
        }
    }
}

fn default_url(url: &str) -> Url {
    Url::parse(url).unwrap_or_else(|error| unreachable!("invalid built-in URL `{url}`: {error}"))
}

/// Ensure the path ends with `/`.
pub(crate) fn normalize(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
