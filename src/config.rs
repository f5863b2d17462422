//! Configuration loaded from the environment.

use crate::application::poller::{PollPolicy, MAX_POLL_ATTEMPTS, POLL_INTERVAL};
use crate::domain::jobs::DEFAULT_ASPECT_RATIO;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "veo-3.0-generate-preview";
pub const DEFAULT_EDIT_MODEL: &str = "gemini-2.5-flash-image-preview";

#[derive(Clone, Debug)]
pub struct StudioConfig {
    /// HTTP server bind address
    pub addr: String,
    /// HTTP server port
    pub port: String,
    /// Base URL of the generation proxy
    pub backend_url: String,
    /// Delay between two status checks of an operation
    pub poll_interval: Duration,
    /// Status checks allowed before a job is failed
    pub max_poll_attempts: u32,
    /// Model used when a request does not name one
    pub default_model: String,
    pub default_aspect_ratio: String,
    /// Image model used by the photo editor
    pub edit_model: String,
    /// Timeout applied to every backend request
    pub request_timeout: Duration,
}

impl StudioConfig {
    /// Load configuration from environment variables, reading `.env` first.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            addr: env::var("ADDR").unwrap_or_else(|_| String::from("127.0.0.1")),
            port: env::var("PORT").unwrap_or_else(|_| String::from("3000")),
            backend_url: env::var("BACKEND_URL")
                .unwrap_or_else(|_| String::from("http://127.0.0.1:8787")),
            poll_interval: Duration::from_millis(parse_or(
                env::var("POLL_INTERVAL_MS").ok(),
                POLL_INTERVAL.as_millis() as u64,
            )),
            max_poll_attempts: parse_or(env::var("MAX_POLL_ATTEMPTS").ok(), MAX_POLL_ATTEMPTS),
            default_model: env::var("DEFAULT_MODEL").unwrap_or_else(|_| String::from(DEFAULT_MODEL)),
            default_aspect_ratio: env::var("DEFAULT_ASPECT_RATIO")
                .unwrap_or_else(|_| String::from(DEFAULT_ASPECT_RATIO)),
            edit_model: env::var("EDIT_MODEL").unwrap_or_else(|_| String::from(DEFAULT_EDIT_MODEL)),
            request_timeout: Duration::from_secs(parse_or(
                env::var("REQUEST_TIMEOUT_SECS").ok(),
                60,
            )),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.addr, self.port)
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: self.poll_interval,
            max_attempts: Some(self.max_poll_attempts),
        }
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unparsable_values_fall_back() {
        assert_eq!(parse_or(Some("250".to_string()), 5000u64), 250);
        assert_eq!(parse_or(Some("soon".to_string()), 5000u64), 5000);
        assert_eq!(parse_or(None, 360u32), 360);
    }

    #[test]
    fn test_poll_policy_from_config() {
        let config = StudioConfig {
            addr: "0.0.0.0".to_string(),
            port: "8080".to_string(),
            backend_url: "http://proxy".to_string(),
            poll_interval: Duration::from_millis(250),
            max_poll_attempts: 4,
            default_model: DEFAULT_MODEL.to_string(),
            default_aspect_ratio: "9:16".to_string(),
            edit_model: DEFAULT_EDIT_MODEL.to_string(),
            request_timeout: Duration::from_secs(5),
        };
        let policy = config.poll_policy();
        assert_eq!(policy.interval, Duration::from_millis(250));
        assert_eq!(policy.max_attempts, Some(4));
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
    }
}
