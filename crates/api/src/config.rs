use std::time::Duration;

use aidi_core::error::CoreError;
use aidi_fleet::BridgeConfig;
use axum::http::HeaderValue;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `60`). Must cover the
    /// bridge's full retry budget.
    pub request_timeout_secs: u64,
    /// Include internal error detail in error responses.
    pub development_mode: bool,
    /// Kill switch: when off, dispatch answers 503 without calling the fleet.
    pub bridge_enabled: bool,
    /// Worker fleet connection settings.
    pub bridge: BridgeConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `60`                       |
    /// | `APP_ENV`              | `production`               |
    /// | `BRIDGE_ENABLED`       | `false`                    |
    ///
    /// The request timeout must cover the bridge's worst-case retry budget
    /// ([`aidi_fleet::RetryPolicy::worst_case_duration`]).
    ///
    /// Bridge variables are documented on [`BridgeConfig::from_env`].
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let host = get("HOST").unwrap_or_else(|| "0.0.0.0".into());

        let port: u16 = get("PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .map_err(|_| CoreError::Configuration("PORT must be a valid u16".into()))?;

        let cors_origins: Vec<String> = get("CORS_ORIGINS")
            .unwrap_or_else(|| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        for origin in &cors_origins {
            origin.parse::<HeaderValue>().map_err(|e| {
                CoreError::Configuration(format!("Invalid CORS origin '{origin}': {e}"))
            })?;
        }

        let request_timeout_secs: u64 = get("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|| "60".into())
            .parse()
            .map_err(|_| {
                CoreError::Configuration("REQUEST_TIMEOUT_SECS must be a valid u64".into())
            })?;

        let development_mode = get("APP_ENV")
            .is_some_and(|env| env.eq_ignore_ascii_case("development"));

        let bridge_enabled = match get("BRIDGE_ENABLED") {
            None => false,
            Some(raw) => match raw.to_ascii_lowercase().as_str() {
                "true" | "1" => true,
                "false" | "0" => false,
                _ => {
                    return Err(CoreError::Configuration(format!(
                        "BRIDGE_ENABLED must be true or false, got {raw:?}"
                    )))
                }
            },
        };

        let bridge = BridgeConfig::from_lookup(&lookup)?;

        let budget = bridge.retry.worst_case_duration();
        if Duration::from_secs(request_timeout_secs) < budget {
            return Err(CoreError::Configuration(format!(
                "REQUEST_TIMEOUT_SECS ({request_timeout_secs}s) is shorter than the bridge retry budget ({}ms)",
                budget.as_millis()
            )));
        }

        Ok(Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            development_mode,
            bridge_enabled,
            bridge,
        })
    }
}
