//! Runtime configuration shared by the server and the CLI

use std::net::SocketAddr;

use crate::error::{Result, UsercastError};

/// Default base address of the user directory API
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3000";

/// Default port for the combined HTTP + relay server
pub const DEFAULT_LISTEN_PORT: u16 = 3001;

/// Default limit for proxied multipart bodies (10 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Upgrade path for relay connections
pub const CABLE_PATH: &str = "/cable";

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Base address of the directory API (`API_BASE_URL`)
    pub api_base_url: String,
    /// Port the combined server binds (`LISTEN_PORT`)
    pub listen_port: u16,
    /// Largest request body the proxy will forward
    pub max_upload_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            listen_port: DEFAULT_LISTEN_PORT,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl AppConfig {
    /// Build a config, validating the API base URL
    pub fn new(api_base_url: &str, listen_port: u16, max_upload_bytes: usize) -> Result<Self> {
        Ok(Self {
            api_base_url: normalize_base_url(api_base_url)?,
            listen_port,
            max_upload_bytes,
        })
    }

    /// Address the server binds (all interfaces)
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.listen_port))
    }

    /// Relay endpoint derived from the API base (`http` -> `ws`)
    pub fn cable_url(&self) -> Result<String> {
        cable_url_for(&self.api_base_url)
    }

    /// Collection URL of the directory API
    pub fn users_url(&self) -> String {
        format!("{}/users", self.api_base_url)
    }
}

/// Validate a base URL and strip any trailing slash
pub fn normalize_base_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    let parsed = reqwest::Url::parse(trimmed)
        .map_err(|e| UsercastError::Config(format!("invalid base URL {:?}: {}", raw, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(trimmed.to_string()),
        other => Err(UsercastError::Config(format!(
            "unsupported scheme {:?} in base URL {:?}",
            other, raw
        ))),
    }
}

/// Map an HTTP base address to its relay endpoint.
///
/// ```
/// let url = usercast::config::cable_url_for("https://api.example.com/").unwrap();
/// assert_eq!(url, "wss://api.example.com/cable");
/// ```
pub fn cable_url_for(base: &str) -> Result<String> {
    let base = normalize_base_url(base)?;
    match base.strip_prefix("http") {
        Some(rest) => Ok(format!("ws{}{}", rest, CABLE_PATH)),
        None => Err(UsercastError::Config(format!(
            "cannot derive relay URL from {:?}",
            base
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.listen_port, 3001);
        assert_eq!(config.users_url(), "http://localhost:3000/users");
        assert_eq!(config.cable_url().unwrap(), "ws://localhost:3000/cable");
        assert_eq!(config.listen_addr().port(), 3001);
    }

    #[test]
    fn test_trailing_slash_is_stripped() {
        let config = AppConfig::new("http://api.local:8080/", 4000, 1024).unwrap();
        assert_eq!(config.api_base_url, "http://api.local:8080");
        assert_eq!(config.users_url(), "http://api.local:8080/users");
    }

    #[test]
    fn test_rejects_bad_base_urls() {
        assert!(AppConfig::new("not a url", 3001, 1).is_err());
        assert!(matches!(
            cable_url_for("ftp://files.local"),
            Err(UsercastError::Config(_))
        ));
    }
}
