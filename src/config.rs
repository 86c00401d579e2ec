//! Environment-driven configuration.
//!
//! The whole surface is enumerated here; nothing is parsed from files.
//!
//! | Variable             | Meaning                     | Default                      |
//! |----------------------|-----------------------------|------------------------------|
//! | `REDIS_HOST`         | transport host              | `localhost`                  |
//! | `REDIS_PORT`         | transport port              | `6379`                       |
//! | `TEMPORAL_ADDRESS`   | engine URL                  | `http://localhost:7233`      |
//! | `ANTHROPIC_API_KEY`  | upstream credential         | required by the activity     |
//! | `ANTHROPIC_BASE_URL` | upstream endpoint override  | `https://api.anthropic.com`  |
//! | `CLAUDE_MODEL`       | model identifier            | `claude-3-7-sonnet-20250219` |

use crate::types::DEFAULT_MODEL;

#[derive(Debug, Clone)]
pub struct Config {
    pub redis_host: String,
    pub redis_port: u16,
    pub temporal_address: String,
    pub anthropic_api_key: Option<String>,
    pub anthropic_base_url: String,
    pub model: String,
}

impl Config {
    /// Read the full configuration from the process environment.
    pub fn from_env() -> Self {
        Self {
            redis_host: std::env::var("REDIS_HOST").unwrap_or_else(|_| "localhost".to_string()),
            redis_port: std::env::var("REDIS_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(6379),
            temporal_address: std::env::var("TEMPORAL_ADDRESS")
                .unwrap_or_else(|_| "http://localhost:7233".to_string()),
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
            anthropic_base_url: std::env::var("ANTHROPIC_BASE_URL")
                .unwrap_or_else(|_| "https://api.anthropic.com".to_string()),
            model: std::env::var("CLAUDE_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
        }
    }

    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}/", self.redis_host, self.redis_port)
    }
}
