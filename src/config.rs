use std::time::Duration;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;

use crate::error::Result;
use crate::media_types::DEFAULT_MANIFEST_TYPES;
use crate::upload::DEFAULT_CHUNK_SIZE;

/// Everything needed to assemble a [`Client`](crate::Client).
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ClientConfig {
    /// Registry host, with an optional port.
    pub domain: String,
    /// Talk plain HTTP.
    #[serde(default)]
    pub insecure: bool,
    /// Sub-path the API is served under.
    #[serde(default)]
    pub path_prefix: Option<String>,
    /// Manifest media types to accept, in order of preference.
    pub accept: Vec<String>,
    pub chunk_size: usize,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl ClientConfig {
    /// Defaults for everything but the domain.
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            insecure: false,
            path_prefix: None,
            accept: DEFAULT_MANIFEST_TYPES.iter().map(|s| s.to_string()).collect(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            timeout_secs: None,
            user_agent: Some(default_user_agent()),
            username: None,
            password: None,
        }
    }

    /// Load from `config/ocidist.*` if present, then from `OCIDIST_*`
    /// environment variables (`OCIDIST_PATH_PREFIX`, `OCIDIST_ACCEPT` as a
    /// comma separated list, ...).
    pub fn load() -> Result<Self> {
        let config = Self::builder()?
            .add_source(File::with_name("config/ocidist").required(false))
            .add_source(
                Environment::with_prefix("OCIDIST")
                    .prefix_separator("_")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("accept"),
            )
            .build()?;
        Ok(config.try_deserialize()?)
    }

    pub(crate) fn builder() -> Result<ConfigBuilder<DefaultState>> {
        Ok(Config::builder()
            .set_default("insecure", false)?
            .set_default("accept", DEFAULT_MANIFEST_TYPES.to_vec())?
            .set_default("chunk_size", DEFAULT_CHUNK_SIZE as u64)?
            .set_default("user_agent", default_user_agent())?)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub(crate) fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some((user.as_str(), pass.as_str())),
            (Some(user), None) => Some((user.as_str(), "")),
            _ => None,
        }
    }
}

fn default_user_agent() -> String {
    format!("ocidist/{}", env!("CARGO_PKG_VERSION"))
}
