//! Dispatch requests and the placement data returned for them.
//!
//! A [`DispatchRequest`] can only be built through validation, so a value of
//! that type always has a non-empty evaluation id, a well-formed target URL
//! and at least one agent. The raw inbound shape is [`DispatchPayload`];
//! convert it with `DispatchRequest::try_from(payload)`.
//!
//! The callback URL is deliberately absent from both types. The bridge
//! computes it from its own public address when it builds the wire body.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use validator::ValidateUrl;

use crate::error::CoreError;
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Commercial tier of the evaluation; the fleet uses it to pick agent budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceTier {
    Free,
    #[serde(alias = "index-pro")]
    Pro,
    Enterprise,
}

impl ServiceTier {
    pub const ALL: [ServiceTier; 3] = [Self::Free, Self::Pro, Self::Enterprise];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
            Self::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for ServiceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceTier {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Self::Free),
            // Legacy spelling still sent by older web-tier builds.
            "pro" | "index-pro" => Ok(Self::Pro),
            "enterprise" => Ok(Self::Enterprise),
            other => Err(CoreError::Validation(format!(
                "Invalid serviceTier: {other}. Must be one of: {}",
                ServiceTier::ALL.map(|t| t.as_str()).join(", ")
            ))),
        }
    }
}

/// Queue priority requested for the job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(Self::High),
            "normal" => Ok(Self::Normal),
            "low" => Ok(Self::Low),
            other => Err(CoreError::Validation(format!(
                "Invalid priority: {other}. Must be one of: high, normal, low"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// DispatchRequest
// ---------------------------------------------------------------------------

/// One evaluation's worth of work, validated and ready to hand to the fleet.
///
/// Serializes to the camelCase JSON the fleet's enqueue endpoint expects.
/// The evaluation id has no setter: every retry of a dispatch carries the
/// id the request was built with.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRequest {
    evaluation_id: String,
    target_url: String,
    service_tier: ServiceTier,
    agents: Vec<String>,
    priority: Priority,
    #[serde(skip_serializing_if = "Map::is_empty")]
    metadata: Map<String, Value>,
}

impl DispatchRequest {
    /// Build a request with `normal` priority and empty metadata.
    ///
    /// Fails with [`CoreError::Validation`] when the evaluation id is blank,
    /// the target URL is not an absolute `http(s)` URL, or `agents` is empty
    /// or contains a blank entry.
    pub fn new(
        evaluation_id: impl Into<String>,
        target_url: impl Into<String>,
        service_tier: ServiceTier,
        agents: Vec<String>,
    ) -> Result<Self, CoreError> {
        let evaluation_id = evaluation_id.into();
        let target_url = target_url.into();

        if evaluation_id.trim().is_empty() {
            return Err(CoreError::Validation(
                "evaluationId must not be empty".to_string(),
            ));
        }
        validate_target_url(&target_url)?;
        validate_agents(&agents)?;

        Ok(Self {
            evaluation_id,
            target_url,
            service_tier,
            agents,
            priority: Priority::default(),
            metadata: Map::new(),
        })
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Add or replace a single metadata entry.
    pub fn insert_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }

    pub fn evaluation_id(&self) -> &str {
        &self.evaluation_id
    }

    pub fn target_url(&self) -> &str {
        &self.target_url
    }

    pub fn service_tier(&self) -> ServiceTier {
        self.service_tier
    }

    pub fn agents(&self) -> &[String] {
        &self.agents
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }
}

fn validate_target_url(target_url: &str) -> Result<(), CoreError> {
    let lower = target_url.to_ascii_lowercase();
    let has_http_scheme = lower.starts_with("http://") || lower.starts_with("https://");
    if !has_http_scheme || !target_url.validate_url() {
        return Err(CoreError::Validation(format!(
            "targetUrl must be an absolute http(s) URL, got {target_url:?}"
        )));
    }
    Ok(())
}

fn validate_agents(agents: &[String]) -> Result<(), CoreError> {
    if agents.is_empty() {
        return Err(CoreError::Validation(
            "At least one agent must be specified".to_string(),
        ));
    }
    if agents.iter().any(|a| a.trim().is_empty()) {
        return Err(CoreError::Validation(
            "agents must not contain empty identifiers".to_string(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// DispatchPayload (raw inbound body)
// ---------------------------------------------------------------------------

/// The inbound JSON body exactly as the web tier sends it.
///
/// Every field is optional so that missing fields produce one descriptive
/// validation error instead of a deserializer message. Unknown fields
/// (including any caller-supplied `callbackUrl`) are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchPayload {
    #[serde(default)]
    pub evaluation_id: Option<String>,
    #[serde(default, alias = "websiteUrl")]
    pub target_url: Option<String>,
    #[serde(default, alias = "tier")]
    pub service_tier: Option<String>,
    #[serde(default)]
    pub agents: Option<Value>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

impl TryFrom<DispatchPayload> for DispatchRequest {
    type Error = CoreError;

    fn try_from(payload: DispatchPayload) -> Result<Self, Self::Error> {
        let evaluation_id = payload.evaluation_id.filter(|s| !s.trim().is_empty());
        let target_url = payload.target_url.filter(|s| !s.trim().is_empty());
        let agents = match payload.agents {
            Some(Value::Array(items)) => Some(items),
            _ => None,
        };

        let missing: Vec<&str> = [
            ("evaluationId", evaluation_id.is_none()),
            ("targetUrl", target_url.is_none()),
            ("agents", agents.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();

        let (Some(evaluation_id), Some(target_url), Some(agents)) =
            (evaluation_id, target_url, agents)
        else {
            return Err(CoreError::Validation(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        };

        let agents = agents
            .into_iter()
            .map(|v| match v {
                Value::String(s) => Ok(s),
                other => Err(CoreError::Validation(format!(
                    "agents must be strings, got {other}"
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let service_tier: ServiceTier = payload.service_tier.as_deref().unwrap_or("").parse()?;

        let priority = match payload.priority.as_deref() {
            None => Priority::default(),
            Some(p) => p.parse()?,
        };

        Ok(
            DispatchRequest::new(evaluation_id, target_url, service_tier, agents)?
                .with_priority(priority)
                .with_metadata(payload.metadata.unwrap_or_default()),
        )
    }
}

// ---------------------------------------------------------------------------
// DispatchOutcome
// ---------------------------------------------------------------------------

/// Placement data the fleet returns synchronously after accepting a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchOutcome {
    /// Fleet-assigned job identifier (opaque).
    pub job_id: String,
    /// Jobs ahead of this one when it was accepted.
    #[serde(default)]
    pub queue_position: u64,
    /// Advisory only.
    #[serde(default)]
    pub estimated_start_time: Option<Timestamp>,
}
