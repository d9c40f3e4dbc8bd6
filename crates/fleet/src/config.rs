use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use aidi_core::error::CoreError;

/// Path on this service that receives fleet results.
pub const CALLBACK_PATH: &str = "/api/v1/bridge/callback";

/// Default capability token lifetime.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(3600);

/// Default `iss` claim stamped on every capability token. The fleet's auth
/// middleware rejects any other issuer.
pub const DEFAULT_TOKEN_ISSUER: &str = "netlify-bridge";

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BACKOFF_MS: [u64; 3] = [1000, 2000, 4000];
const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Bounded retry settings for calls to the fleet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before retry `n` is `backoff[n - 1]`; the last entry repeats.
    pub backoff: Vec<Duration>,
    /// Deadline for a single attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF_MS
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }
}

impl RetryPolicy {
    /// Delay to sleep after the failed attempt at zero-based `attempt_index`.
    ///
    /// Indices past the end of the sequence reuse the last delay.
    pub fn delay_for(&self, attempt_index: usize) -> Duration {
        self.backoff
            .get(attempt_index)
            .or_else(|| self.backoff.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    /// Longest a fully retried call can take: every attempt hitting its
    /// deadline plus every backoff sleep in between.
    pub fn worst_case_duration(&self) -> Duration {
        let attempts = self.max_attempts.max(1);
        let deadlines = self.attempt_timeout * attempts;
        let sleeps: Duration = (0..attempts - 1)
            .map(|i| self.delay_for(i as usize))
            .sum();
        deadlines + sleeps
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.max_attempts == 0 {
            return Err(CoreError::Configuration(
                "retry policy needs at least one attempt".to_string(),
            ));
        }
        if self.backoff.is_empty() {
            return Err(CoreError::Configuration(
                "retry policy needs at least one backoff delay".to_string(),
            ));
        }
        if self.attempt_timeout.is_zero() {
            return Err(CoreError::Configuration(
                "per-attempt timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Process-wide bridge configuration, read once at startup and never mutated.
#[derive(Clone)]
pub struct BridgeConfig {
    /// Base URL of the worker fleet, e.g. `https://workers.internal`.
    pub fleet_base_url: String,
    /// This service's own public address, used to build the callback URL.
    pub public_base_url: String,
    /// HMAC secret for capability tokens. When `None`, every token issuance
    /// fails with a configuration error.
    pub signing_secret: Option<String>,
    pub token_issuer: String,
    pub token_ttl: Duration,
    pub retry: RetryPolicy,
}

impl fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("fleet_base_url", &self.fleet_base_url)
            .field("public_base_url", &self.public_base_url)
            .field(
                "signing_secret",
                &self.signing_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("token_issuer", &self.token_issuer)
            .field("token_ttl", &self.token_ttl)
            .field("retry", &self.retry)
            .finish()
    }
}

impl BridgeConfig {
    /// Build a config with default token and retry settings and no secret.
    pub fn new(fleet_base_url: impl Into<String>, public_base_url: impl Into<String>) -> Self {
        Self {
            fleet_base_url: fleet_base_url.into(),
            public_base_url: public_base_url.into(),
            signing_secret: None,
            token_issuer: DEFAULT_TOKEN_ISSUER.to_string(),
            token_ttl: DEFAULT_TOKEN_TTL,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_signing_secret(mut self, secret: impl Into<String>) -> Self {
        self.signing_secret = Some(secret.into());
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Load configuration from environment variables.
    ///
    /// | Env Var                     | Required | Default           |
    /// |-----------------------------|----------|-------------------|
    /// | `FLEET_BASE_URL`            | **yes**  | --                |
    /// | `PUBLIC_BASE_URL`           | **yes**  | --                |
    /// | `BRIDGE_SIGNING_SECRET`     | no*      | --                |
    /// | `BRIDGE_TOKEN_ISSUER`       | no       | `netlify-bridge`  |
    /// | `BRIDGE_TOKEN_TTL_SECS`     | no       | `3600`            |
    /// | `BRIDGE_MAX_ATTEMPTS`       | no       | `3`               |
    /// | `BRIDGE_BACKOFF_MS`         | no       | `1000,2000,4000`  |
    /// | `BRIDGE_ATTEMPT_TIMEOUT_MS` | no       | `10000`           |
    ///
    /// (*) Without a secret the config loads, but no token can be issued.
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`BridgeConfig::from_env`] with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |name: &str| {
            get(name).ok_or_else(|| CoreError::Configuration(format!("{name} must be set")))
        };

        let fleet_base_url = required("FLEET_BASE_URL")?;
        let public_base_url = required("PUBLIC_BASE_URL")?;
        let signing_secret = get("BRIDGE_SIGNING_SECRET");
        let token_issuer =
            get("BRIDGE_TOKEN_ISSUER").unwrap_or_else(|| DEFAULT_TOKEN_ISSUER.to_string());
        let token_ttl = Duration::from_secs(parse_or(
            "BRIDGE_TOKEN_TTL_SECS",
            get("BRIDGE_TOKEN_TTL_SECS"),
            DEFAULT_TOKEN_TTL.as_secs(),
        )?);

        let defaults = RetryPolicy::default();
        let max_attempts = parse_or(
            "BRIDGE_MAX_ATTEMPTS",
            get("BRIDGE_MAX_ATTEMPTS"),
            defaults.max_attempts,
        )?;
        let backoff = match get("BRIDGE_BACKOFF_MS") {
            Some(raw) => parse_backoff(&raw)?,
            None => defaults.backoff,
        };
        let attempt_timeout = match get("BRIDGE_ATTEMPT_TIMEOUT_MS") {
            Some(raw) => Duration::from_millis(parse_value("BRIDGE_ATTEMPT_TIMEOUT_MS", &raw)?),
            None => defaults.attempt_timeout,
        };

        let retry = RetryPolicy {
            max_attempts,
            backoff,
            attempt_timeout,
        };
        retry.validate()?;

        Ok(Self {
            fleet_base_url,
            public_base_url,
            signing_secret,
            token_issuer,
            token_ttl,
            retry,
        })
    }

    /// The only callback URL the bridge ever hands to the fleet.
    pub fn callback_url(&self) -> String {
        format!(
            "{}{CALLBACK_PATH}",
            self.public_base_url.trim_end_matches('/')
        )
    }
}

fn parse_value<T: FromStr>(name: &str, raw: &str) -> Result<T, CoreError> {
    raw.parse()
        .map_err(|_| CoreError::Configuration(format!("{name} has an invalid value: {raw:?}")))
}

fn parse_or<T: FromStr>(name: &str, raw: Option<String>, default: T) -> Result<T, CoreError> {
    match raw {
        Some(raw) => parse_value(name, &raw),
        None => Ok(default),
    }
}

/// Parse a comma-separated list of millisecond delays, e.g. `1000,2000,4000`.
fn parse_backoff(raw: &str) -> Result<Vec<Duration>, CoreError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_value::<u64>("BRIDGE_BACKOFF_MS", s).map(Duration::from_millis))
        .collect()
}
