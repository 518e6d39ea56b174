// Application configuration
//
// Settings are layered: serde defaults, then an optional `trip-expenses.toml`
// next to the working directory, then environment variables with the
// `TRIP_EXPENSES` prefix and `__` as the nesting separator:
//
// - `TRIP_EXPENSES__DATABASE__PATH=/var/lib/trips.db` -> `database.path`
// - `TRIP_EXPENSES__SERVER__PORT=9000` -> `server.port`
//
// A `.env` file is read first when present.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::ConfigError;

const CONFIG_FILE: &str = "trip-expenses";
const ENV_PREFIX: &str = "TRIP_EXPENSES";

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
}

/// SQLite database location
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            path: PathBuf::from("trip.db"),
        }
    }
}

/// HTTP server settings (only read by `trip-server`)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,

    /// Origin allowed by CORS (the frontend dev server)
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_origin: "http://localhost:5173".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("server address: {}", e)))
    }
}

impl AppConfig {
    /// Load configuration from `.env`, the optional config file and the environment
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Self::from_environment(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
    }

    fn from_environment(environment: config::Environment) -> Result<Self, ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(CONFIG_FILE).required(false))
            .add_source(environment)
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("database.path is empty".to_string()));
        }
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must be non-zero".to_string()));
        }
        self.server.socket_addr()?;

        Ok(())
    }
}
