use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

const DEFAULT_LOG_FILTER: &str = "info,flux_dispatch=debug";
const DEFAULT_MAX_TODOS: usize = 100;

/// Demo configuration loaded from environment variables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Log filter used when `RUST_LOG` is not set
    pub log_filter: String,
    /// How many todos the todo store accepts before rejecting `ADD_TODO`
    pub max_todos: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            log_filter: lookup("FLUX_DEMO_LOG").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            max_todos: match lookup("FLUX_DEMO_MAX_TODOS") {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .context("FLUX_DEMO_MAX_TODOS must be a valid number")?,
                None => DEFAULT_MAX_TODOS,
            },
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            max_todos: DEFAULT_MAX_TODOS,
        }
    }
}
