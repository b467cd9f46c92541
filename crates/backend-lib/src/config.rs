// ============================
// crates/backend-lib/src/config.rs
// ============================
//! Configuration management.
//!
//! Layers, lowest priority first: built-in defaults, the TOML file, the plain `HOST`/`PORT`/
//! `NO_BROWSER` variables, `SCORCHED_*` variables, then command-line overrides.

use crate::error::AppError;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file read when no explicit path is given
pub const DEFAULT_CONFIG_FILE: &str = "scorched-signal.toml";
pub const ENV_PREFIX: &str = "SCORCHED_";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Listen host
    pub host: String,
    /// Listen port
    pub port: u16,
    /// Skip opening the lobby page in a browser on startup
    #[serde(deserialize_with = "lenient_bool")]
    pub no_browser: bool,
    /// Directory of the static web client
    pub web_root: PathBuf,
    /// Default tracing filter when `RUST_LOG` is unset
    pub log_level: String,
    /// Emit JSON log lines instead of the human format
    pub log_json: bool,
    /// Idle time after which a room is reaped
    pub room_ttl_secs: u64,
    /// Time between reaper sweeps
    pub reap_interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8787,
            no_browser: false,
            web_root: PathBuf::from("web"),
            log_level: "info".to_string(),
            log_json: false,
            room_ttl_secs: 5 * 60,
            reap_interval_secs: 30,
        }
    }
}

/// Values given on the command line; unset fields leave lower layers alone
#[derive(Debug, Clone, Default, Serialize)]
pub struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_browser: Option<bool>,
}

/// Accepts `true`/`false`, `1`/`0` and their string spellings
fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
        Text(String),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(value) => Ok(value),
        Flag::Int(value) => Ok(value != 0),
        Flag::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "" | "0" | "false" | "no" | "off" => Ok(false),
            other => Err(serde::de::Error::custom(format!("invalid boolean: {other}"))),
        },
    }
}

impl Settings {
    /// The layered figment for `path` (or [`DEFAULT_CONFIG_FILE`])
    pub fn figment(path: Option<&Path>) -> Figment {
        let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(file))
            .merge(Env::raw().only(&["host", "port", "no_browser"]))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    /// Load settings from all sources with `overrides` on top
    pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<Self, figment::Error> {
        Self::figment(path)
            .merge(Serialized::defaults(overrides))
            .extract()
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return Err(AppError::InvalidConfig(format!(
                "unknown log level: {}",
                self.log_level
            )));
        }
        if self.room_ttl_secs == 0 {
            return Err(AppError::InvalidConfig("room_ttl_secs must be positive".to_string()));
        }
        if self.reap_interval_secs == 0 {
            return Err(AppError::InvalidConfig(
                "reap_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Local URL of the lobby page
    pub fn browser_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn room_ttl(&self) -> Duration {
        Duration::from_secs(self.room_ttl_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }
}
