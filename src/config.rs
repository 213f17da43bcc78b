//! Client configuration.
//!
//! Loaded from an optional JSON file and then overridden by environment
//! variables, so a device can be pointed at another backend without
//! rewriting the file.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_API_URL: &str = "WAITER_API_URL";
const ENV_DATA_DIR: &str = "WAITER_DATA_DIR";
const ENV_LOG_DIR: &str = "WAITER_LOG_DIR";
const ENV_TIMEOUT_SECS: &str = "WAITER_REQUEST_TIMEOUT_SECS";

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LOG_FILTER: &str = "info,waiter_ledger_lib=debug";
const APP_DIR_NAME: &str = "com.thesmall.waiter";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    /// Backend base URL including its API prefix, e.g. `http://host/restaurant/public/api`.
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub log_filter: String,
    /// Write the log file as JSON lines instead of plain text.
    pub log_json: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let base = default_base_dir();
        Self {
            api_base_url: String::new(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            data_dir: base.join("data"),
            log_dir: base.join("logs"),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            log_json: false,
        }
    }
}

impl ClientConfig {
    /// Read `path` (when it exists), then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, String> {
        let mut config = match path {
            Some(p) if p.exists() => {
                let raw = std::fs::read_to_string(p)
                    .map_err(|e| format!("read config {}: {e}", p.display()))?;
                serde_json::from_str::<ClientConfig>(&raw)
                    .map_err(|e| format!("parse config {}: {e}", p.display()))?
            }
            _ => ClientConfig::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.api_base_url = normalize_api_url(&config.api_base_url);
        Ok(config)
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = lookup(ENV_API_URL) {
            self.api_base_url = url;
        }
        if let Some(dir) = lookup(ENV_DATA_DIR) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup(ENV_LOG_DIR) {
            self.log_dir = PathBuf::from(dir);
        }
        if let Some(secs) = lookup(ENV_TIMEOUT_SECS).and_then(|v| v.trim().parse::<u64>().ok()) {
            self.request_timeout_secs = secs.max(1);
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Normalise the backend URL:
/// - ensure a scheme is present (http for localhost and bare IPs, https otherwise)
/// - strip trailing slashes
///
/// The API prefix (`/api`) is part of the base and is kept.
pub fn normalize_api_url(url: &str) -> String {
    let mut url = url.trim().to_string();
    if url.is_empty() {
        return url;
    }

    if !url.starts_with("http://") && !url.starts_with("https://") {
        let host = url.split(['/', ':']).next().unwrap_or_default();
        let is_ip = !host.is_empty() && host.chars().all(|c| c.is_ascii_digit() || c == '.');
        if host == "localhost" || is_ip {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    while url.ends_with('/') {
        url.pop();
    }

    url
}

fn default_base_dir() -> PathBuf {
    std::env::var("LOCALAPPDATA")
        .or_else(|_| std::env::var("XDG_DATA_HOME"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()))
                .join(".local")
                .join("share")
        })
        .join(APP_DIR_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_normalize_api_url() {
        assert_eq!(
            normalize_api_url("192.168.1.76/restaurant/public/api/"),
            "http://192.168.1.76/restaurant/public/api"
        );
        assert_eq!(normalize_api_url("localhost:8000/api"), "http://localhost:8000/api");
        assert_eq!(
            normalize_api_url("orders.example.com/api//"),
            "https://orders.example.com/api"
        );
        assert_eq!(
            normalize_api_url("https://orders.example.com/api"),
            "https://orders.example.com/api"
        );
        assert_eq!(normalize_api_url("   "), "");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"apiBaseUrl":"http://pos.local/api"}"#).unwrap();
        assert_eq!(config.api_base_url, "http://pos.local/api");
        assert_eq!(config.request_timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(config.log_filter, DEFAULT_LOG_FILTER);
        assert!(!config.log_json);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_API_URL, "10.0.0.2/api"),
            (ENV_TIMEOUT_SECS, "0"),
            (ENV_DATA_DIR, " "),
        ]);
        let mut config = ClientConfig::default();
        let data_dir = config.data_dir.clone();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.api_base_url, "10.0.0.2/api");
        assert_eq!(config.request_timeout_secs, 1);
        assert_eq!(config.data_dir, data_dir);
    }

    #[test]
    fn test_load_missing_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join("waiter-ledger-missing-config.json");
        let config = ClientConfig::load(Some(&path)).unwrap();
        assert_eq!(config.request_timeout(), Duration::from_secs(config.request_timeout_secs));
    }
}
