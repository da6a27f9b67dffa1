use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

pub const DEFAULT_ENDPOINT: &str = "sandbox-invest-public-api.tinkoff.ru:443";
pub const DEFAULT_APP_NAME: &str = "investapi-client-rs";

/// Connection settings read from the YAML config file.
///
/// Keys follow the layout shared with the other SDKs of the API
/// (`EndPoint`, `APIToken`, ...). Keys this crate does not understand are
/// ignored so one file can serve several clients.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Config {
    #[serde(rename = "EndPoint", default = "default_endpoint")]
    pub endpoint: String,
    #[serde(rename = "APIToken", default)]
    pub token: String,
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(rename = "ConnectTimeout", default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(rename = "RequestTimeout", default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_app_name() -> String {
    DEFAULT_APP_NAME.to_string()
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_request_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "debug".to_string()
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_yaml(&raw)
            .with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.token.trim().is_empty() {
            return Err(anyhow!("APIToken must be set"));
        }
        if self.endpoint.trim().is_empty() {
            return Err(anyhow!("EndPoint must not be empty"));
        }
        self.level()?;
        Ok(())
    }

    /// `https://` URI of the endpoint; an explicit scheme is kept as is.
    pub fn endpoint_uri(&self) -> String {
        if self.endpoint.contains("://") {
            self.endpoint.clone()
        } else {
            format!("https://{}", self.endpoint)
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn level(&self) -> Result<Level> {
        parse_level(&self.log_level)
    }
}

pub fn parse_level(value: &str) -> Result<Level> {
    value
        .trim()
        .parse::<Level>()
        .map_err(|_| anyhow!("unknown log level {value:?}"))
}
