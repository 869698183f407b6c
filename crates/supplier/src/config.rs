//! Supplier client configuration.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Supplier API configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplierConfig {
    /// GraphQL endpoint
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer token, if the supplier requires one
    #[serde(default)]
    pub access_token: Option<String>,
    /// Per-request timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Products requested per page
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Estimated cost overrides keyed by operation name
    #[serde(default)]
    pub cost_overrides: HashMap<String, f64>,
}

fn default_base_url() -> String {
    "http://localhost:8081/graphql".to_string()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_page_size() -> u32 {
    50
}

impl Default for SupplierConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            access_token: None,
            request_timeout_ms: default_request_timeout_ms(),
            page_size: default_page_size(),
            cost_overrides: HashMap::new(),
        }
    }
}

impl SupplierConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
