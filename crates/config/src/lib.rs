use std::env;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub database_path: String,
    pub api_host: String,
    pub api_port: u16,
    pub log_filter: String,
}

impl Config {
    /// Load configuration from the process environment, after reading a
    /// `.env` file if one exists.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Build the configuration from any variable lookup.
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let api_port = var("API_PORT", "3000")
            .parse::<u16>()
            .map_err(|e: std::num::ParseIntError| ConfigError::Invalid {
                name: "API_PORT",
                reason: e.to_string(),
            })?;

        Ok(Config {
            database_path: var("DATABASE_PATH", "storekeeper.db"),
            api_host: var("API_HOST", "127.0.0.1"),
            api_port,
            log_filter: var("LOG_FILTER", "info"),
        })
    }

    pub fn api_address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }
}
