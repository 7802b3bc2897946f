//! Server configuration

use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use watchparty_shared_config::{CommonConfig, Environment, SyncConfig};

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Common configuration shared with other services
    pub common: CommonConfig,

    /// Interface to bind (default: 0.0.0.0)
    pub host: IpAddr,

    /// Server port (default: 8524)
    pub port: u16,

    /// CORS allowed origins (optional; required in production)
    pub cors_allowed_origins: Option<Vec<String>>,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// In production `CORS_ORIGINS` must be set; development falls back to a
    /// permissive CORS policy when it is absent.
    pub fn from_env() -> Result<Self> {
        let environment = Environment::from_str(
            &env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        )
        .unwrap_or_default();

        let cors_allowed_origins = Self::load_cors_origins(environment.is_production())?;

        let common = CommonConfig::from_env()
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

        Ok(Self {
            common,

            host: env::var("BIND_HOST")
                .unwrap_or_else(|_| "0.0.0.0".to_string())
                .parse()
                .context("Invalid BIND_HOST value")?,

            port: env::var("PORT")
                .unwrap_or_else(|_| "8524".to_string())
                .parse()
                .context("Invalid PORT value")?,

            cors_allowed_origins,
        })
    }

    /// Parse `CORS_ORIGINS` as a comma-separated list
    fn load_cors_origins(is_production: bool) -> Result<Option<Vec<String>>> {
        let origins: Option<Vec<String>> = env::var("CORS_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|origins| !origins.is_empty());

        if origins.is_none() && is_production {
            bail!(
                "CORS_ORIGINS environment variable is required in production. \
                 Please set a comma-separated list of allowed origins."
            );
        }
        Ok(origins)
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Session synchronization settings
    pub fn sync(&self) -> &SyncConfig {
        &self.common.sync
    }

    pub fn environment(&self) -> Environment {
        self.common.environment
    }

    /// Log filter directives from `RUST_LOG` or `LOG_LEVEL`
    pub fn log_level(&self) -> Option<&str> {
        self.common.log_level.as_deref()
    }

    pub fn is_production(&self) -> bool {
        self.common.environment.is_production()
    }
}
