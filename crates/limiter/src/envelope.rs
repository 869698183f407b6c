//! Cost metadata attached to upstream responses.

use serde::{Deserialize, Serialize};

/// Upstream view of the quota at response time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThrottleStatus {
    pub maximum_available: f64,
    pub currently_available: f64,
    pub restore_rate: f64,
}

/// Cost annotation of a single response.
///
/// Every field is optional: a response without it leaves the limiter on
/// local estimates alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CostEnvelope {
    #[serde(default, alias = "requestedQueryCost")]
    pub requested_cost: Option<f64>,
    #[serde(default, alias = "actualQueryCost")]
    pub actual_cost: Option<f64>,
    #[serde(default)]
    pub throttle_status: Option<ThrottleStatus>,
}

impl CostEnvelope {
    /// Extracts `extensions.cost` from a GraphQL-style response body.
    pub fn from_response(body: &serde_json::Value) -> Option<Self> {
        let cost = body.get("extensions")?.get("cost")?;
        serde_json::from_value(cost.clone()).ok()
    }

    pub fn is_authoritative(&self) -> bool {
        self.throttle_status.is_some()
    }
}
