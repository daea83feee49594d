use std::path::PathBuf;
use std::time::Duration;

use crate::limits::{DEFAULT_CACHE_COMPACT_THRESHOLD, DEFAULT_POLL_INTERVAL};

pub const DEFAULT_STORE_URL: &str = "https://firestore.googleapis.com";
pub const DEFAULT_AUTH_URL: &str = "https://identitytoolkit.googleapis.com";
pub const DEFAULT_TOKEN_URL: &str = "https://securetoken.googleapis.com";
pub const DEFAULT_PROBE_ADDR: &str = "firestore.googleapis.com:443";
pub const DEFAULT_CACHE_PATH: &str = "./data/courtside.log";

/// Runtime settings, read from `COURTSIDE_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub project_id: String,
    pub api_key: String,
    pub store_url: String,
    pub auth_url: String,
    pub token_url: String,
    pub poll_interval: Duration,
    pub cache_path: PathBuf,
    pub cache_compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub watch_facility: Option<String>,
    pub id_token: Option<String>,
    pub refresh_token: Option<String>,
    pub probe_addr: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unset or unparsable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let get_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let poll_interval = get("COURTSIDE_POLL_SECS")
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|s| s.is_finite() && *s > 0.0)
            .map(Duration::from_secs_f64)
            .unwrap_or(DEFAULT_POLL_INTERVAL);

        Self {
            project_id: get_or("COURTSIDE_PROJECT_ID", ""),
            api_key: get_or("COURTSIDE_API_KEY", ""),
            store_url: get_or("COURTSIDE_STORE_URL", DEFAULT_STORE_URL),
            auth_url: get_or("COURTSIDE_AUTH_URL", DEFAULT_AUTH_URL),
            token_url: get_or("COURTSIDE_TOKEN_URL", DEFAULT_TOKEN_URL),
            poll_interval,
            cache_path: PathBuf::from(get_or("COURTSIDE_CACHE_PATH", DEFAULT_CACHE_PATH)),
            cache_compact_threshold: get("COURTSIDE_CACHE_COMPACT_THRESHOLD")
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_CACHE_COMPACT_THRESHOLD),
            metrics_port: get("COURTSIDE_METRICS_PORT").and_then(|s| s.parse().ok()),
            watch_facility: get("COURTSIDE_WATCH_FACILITY"),
            id_token: get("COURTSIDE_ID_TOKEN"),
            refresh_token: get("COURTSIDE_REFRESH_TOKEN"),
            probe_addr: get_or("COURTSIDE_PROBE_ADDR", DEFAULT_PROBE_ADDR),
        }
    }
}
