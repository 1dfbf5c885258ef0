use clap::Parser;
use wnsm::{ApiKeySource, ClientOptions, Smartmeter};

use crate::prelude::*;

#[derive(Parser)]
pub struct AccountArgs {
    #[clap(long = "username", env = "WNSM_USERNAME")]
    username: String,

    #[clap(long = "password", env = "WNSM_PASSWORD", hide_env_values = true)]
    password: String,

    /// Timeout of a single portal request.
    #[clap(long = "timeout", env = "WNSM_TIMEOUT", default_value = "30s")]
    timeout: humantime::Duration,

    /// Where the gateway API keys are read from.
    #[clap(long = "api-key-source", env = "WNSM_API_KEY_SOURCE", default_value = "app-config")]
    api_key_source: KeySource,
}

impl AccountArgs {
    /// Create a client, not logged in yet.
    pub fn new_client(&self) -> Result<Smartmeter> {
        let options = ClientOptions::builder()
            .timeout(self.timeout.into())
            .api_key_source(self.api_key_source.into())
            .build();
        Smartmeter::with_options(&self.username, &self.password, options)
            .context("failed to create the portal client")
    }
}

#[derive(Copy, Clone, Debug, clap::ValueEnum)]
pub enum KeySource {
    /// Application configuration `app-config.json`.
    AppConfig,

    /// Main JavaScript bundle of the portal page.
    Bundle,
}

impl From<KeySource> for ApiKeySource {
    fn from(source: KeySource) -> Self {
        match source {
            KeySource::AppConfig => Self::AppConfig,
            KeySource::Bundle => Self::Bundle,
        }
    }
}
