//! Launcher configuration (env-driven).

use anyhow::{Context, Result};

use crate::forwarder::DEFAULT_BUFFER_SIZE;

/// Default listening port when `FORWARDER_PORT` is unset.
pub const DEFAULT_PORT: u16 = 8888;

/// Launcher configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Local port to listen on.
    pub port: u16,

    /// Full target URL; the launcher splits it into a base URL for the
    /// forwarder and a path for consumers to request.
    pub target_url: String,

    /// Transfer buffer size for response relaying.
    pub buffer_size: usize,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let target_url = std::env::var("FORWARDER_TARGET_URL")
            .context("Missing target URL. Set FORWARDER_TARGET_URL.")?;

        let port: u16 = std::env::var("FORWARDER_PORT")
            .ok()
            .map(|v| v.parse())
            .transpose()
            .context("FORWARDER_PORT must be a port number.")?
            .unwrap_or(DEFAULT_PORT);

        let buffer_size: usize = std::env::var("FORWARDER_BUFFER_SIZE")
            .ok()
            .map(|v| v.parse())
            .transpose()
            .context("FORWARDER_BUFFER_SIZE must be an integer (bytes).")?
            .unwrap_or(DEFAULT_BUFFER_SIZE)
            .max(1);

        let log_level =
            std::env::var("FORWARDER_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            port,
            target_url,
            buffer_size,
            log_level,
        })
    }

    /// Split the target URL into the forwarder's base URL and the path
    /// consumers should request against `http://localhost:<port>`.
    ///
    /// `https://host:port/a/b?q=1` yields `("https://host:port", "/a/b")`.
    pub fn split_target(&self) -> Result<(String, String)> {
        let url = reqwest::Url::parse(&self.target_url)
            .context("FORWARDER_TARGET_URL must be a valid absolute URL.")?;

        let host = url
            .host_str()
            .context("FORWARDER_TARGET_URL must have a host.")?;

        let base = match url.port() {
            Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
            None => format!("{}://{}", url.scheme(), host),
        };

        Ok((base, url.path().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_for(target_url: &str) -> Config {
        Config {
            port: DEFAULT_PORT,
            target_url: target_url.to_string(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            log_level: "info".to_string(),
        }
    }

    #[test]
    fn splits_target_into_base_and_path() {
        let (base, path) = config_for("https://origin.example/live/stream.m3u8")
            .split_target()
            .unwrap();
        assert_eq!(base, "https://origin.example");
        assert_eq!(path, "/live/stream.m3u8");
    }

    #[test]
    fn explicit_port_is_kept_in_base() {
        let (base, path) = config_for("http://origin.example:8080/x")
            .split_target()
            .unwrap();
        assert_eq!(base, "http://origin.example:8080");
        assert_eq!(path, "/x");
    }

    #[test]
    fn query_string_is_not_part_of_the_path() {
        let (_, path) = config_for("http://origin.example/a/b?q=1")
            .split_target()
            .unwrap();
        assert_eq!(path, "/a/b");
    }

    #[test]
    fn relative_target_is_rejected() {
        assert!(config_for("not-a-url").split_target().is_err());
    }
}
