//! Capability tokens scoped to a single evaluation.
//!
//! Tokens are HS256-signed JWTs carrying [`CapabilityClaims`]. The fleet
//! verifies them with the shared secret alone, so no call back to the
//! issuer is needed. A token authorizes exactly the listed agents for one
//! evaluation and names the only callback URL the fleet may invoke.
//!
//! Neither the secret nor a minted token is ever logged.

use std::fmt;
use std::time::Duration;

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::BridgeConfig;

/// Evaluation id placeholder used by the queue-metrics read token.
pub const METRICS_SCOPE_ID: &str = "queue-metrics";

/// Callback value that the fleet must never act on.
pub const NON_ACTIONABLE_CALLBACK: &str = "none";

/// Claims embedded in every capability token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityClaims {
    pub evaluation_id: String,
    /// The fleet must refuse any agent not in this list.
    pub allowed_agents: Vec<String>,
    pub callback_url: String,
    pub iss: String,
    /// Issued-at time (UTC Unix timestamp).
    pub iat: i64,
    /// Expiration time (UTC Unix timestamp).
    pub exp: i64,
    /// Unique per token, so two tokens for the same scope never collide.
    pub jti: String,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token signing secret is not configured")]
    MissingSecret,

    #[error("failed to sign capability token: {0}")]
    Encode(#[source] jsonwebtoken::errors::Error),

    #[error("capability token rejected: {0}")]
    Invalid(#[source] jsonwebtoken::errors::Error),
}

#[derive(Clone)]
struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

/// Mints and verifies capability tokens with a process-wide secret.
#[derive(Clone)]
pub struct TokenIssuer {
    keys: Option<SigningKeys>,
    issuer: String,
    default_ttl: Duration,
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("configured", &self.keys.is_some())
            .field("issuer", &self.issuer)
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl TokenIssuer {
    /// An empty or absent secret leaves the issuer unconfigured.
    pub fn new(secret: Option<&str>, issuer: impl Into<String>, default_ttl: Duration) -> Self {
        let keys = secret.filter(|s| !s.is_empty()).map(|s| SigningKeys {
            encoding: EncodingKey::from_secret(s.as_bytes()),
            decoding: DecodingKey::from_secret(s.as_bytes()),
        });
        Self {
            keys,
            issuer: issuer.into(),
            default_ttl,
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(
            config.signing_secret.as_deref(),
            config.token_issuer.clone(),
            config.token_ttl,
        )
    }

    pub fn is_configured(&self) -> bool {
        self.keys.is_some()
    }

    pub fn ensure_configured(&self) -> Result<(), TokenError> {
        self.keys.as_ref().map(|_| ()).ok_or(TokenError::MissingSecret)
    }

    /// Mint a token for one evaluation. `ttl` defaults to the issuer's
    /// configured lifetime.
    pub fn issue(
        &self,
        evaluation_id: &str,
        allowed_agents: &[String],
        callback_url: &str,
        ttl: Option<Duration>,
    ) -> Result<String, TokenError> {
        let keys = self.keys.as_ref().ok_or(TokenError::MissingSecret)?;

        let now = chrono::Utc::now().timestamp();
        let ttl_secs = i64::try_from(ttl.unwrap_or(self.default_ttl).as_secs()).unwrap_or(i64::MAX);

        let claims = CapabilityClaims {
            evaluation_id: evaluation_id.to_string(),
            allowed_agents: allowed_agents.to_vec(),
            callback_url: callback_url.to_string(),
            iss: self.issuer.clone(),
            iat: now,
            exp: now.saturating_add(ttl_secs),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding).map_err(TokenError::Encode)
    }

    /// Validate signature, expiry and issuer, returning the embedded claims.
    pub fn verify(&self, token: &str) -> Result<CapabilityClaims, TokenError> {
        let keys = self.keys.as_ref().ok_or(TokenError::MissingSecret)?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.issuer.as_str()]);

        decode::<CapabilityClaims>(token, &keys.decoding, &validation)
            .map(|data| data.claims)
            .map_err(TokenError::Invalid)
    }
}
