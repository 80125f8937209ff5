//! Application configuration loaded from environment variables.

use crate::errors::{ApiError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// Size of the SQLite connection pool
    pub max_connections: u32,
    /// How often (in seconds) to cancel expired donations; 0 disables the sweep
    pub expiry_sweep_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./annsetu.db".to_string()),
            api_port: env_var("API_PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .map_err(|_| ApiError::Config("Invalid API_PORT".to_string()))?,
            max_connections: env_var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| ApiError::Config("Invalid DB_MAX_CONNECTIONS".to_string()))?,
            expiry_sweep_secs: env_var("EXPIRY_SWEEP_SECS")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .map_err(|_| ApiError::Config("Invalid EXPIRY_SWEEP_SECS".to_string()))?,
        })
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| ApiError::Config(format!("Missing env var: {key}")))
}
