//! Runtime settings: built-in defaults, then an optional file, then
//! `POLYBOOK__SECTION__KEY` environment variables.

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::market_data::adapters::polymarket::DEFAULT_REST_URL;
use crate::market_data::reconcile::ReconcileConfig;
use crate::market_data::stream::{StreamConfig, DEFAULT_WS_URL};

#[derive(Debug, Clone, Deserialize)]
pub struct RestSettings {
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamSettings {
    pub url: String,
    pub keepalive_secs: u64,
    pub close_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconcileSettings {
    pub interval_secs: u64,
    pub history_every: u64,
    pub history_interval: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub rest: RestSettings,
    pub stream: StreamSettings,
    pub reconcile: ReconcileSettings,
    pub log_filter: String,
    pub auto_reconnect: bool,
    pub reconnect_delay_secs: u64,
}

impl Settings {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, Environment::with_prefix("POLYBOOK").separator("__"))
    }

    fn load_with_env(path: Option<&Path>, env: Environment) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("rest.base_url", DEFAULT_REST_URL)?
            .set_default("stream.url", DEFAULT_WS_URL)?
            .set_default("stream.keepalive_secs", 15)?
            .set_default("stream.close_timeout_ms", 2000)?
            .set_default("reconcile.interval_secs", 15)?
            .set_default("reconcile.history_every", 4)?
            .set_default("reconcile.history_interval", "1d")?
            .set_default("log_filter", "info")?
            .set_default("auto_reconnect", false)?
            .set_default("reconnect_delay_secs", 5)?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        let settings: Settings = builder.add_source(env).build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let periods = [
            ("stream.keepalive_secs", self.stream.keepalive_secs),
            ("stream.close_timeout_ms", self.stream.close_timeout_ms),
            ("reconcile.interval_secs", self.reconcile.interval_secs),
        ];
        match periods.iter().find(|(_, value)| *value == 0) {
            Some((key, _)) => Err(ConfigError::Message(format!("{key} must be greater than zero"))),
            None => Ok(()),
        }
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            url: self.stream.url.clone(),
            keepalive: Duration::from_secs(self.stream.keepalive_secs),
            close_timeout: Duration::from_millis(self.stream.close_timeout_ms),
        }
    }

    pub fn reconcile_config(&self) -> ReconcileConfig {
        ReconcileConfig {
            interval: Duration::from_secs(self.reconcile.interval_secs),
            history_every: self.reconcile.history_every,
            history_interval: self.reconcile.history_interval.clone(),
        }
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}
