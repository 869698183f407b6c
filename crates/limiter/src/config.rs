//! Limiter configuration.

use serde::{Deserialize, Serialize};
use sync_core::{Error, Result};

/// Cost bucket configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Maximum points the bucket can hold
    #[serde(default = "default_max_cost")]
    pub max_cost: f64,
    /// Points restored per second
    #[serde(default = "default_restore_rate")]
    pub restore_rate: f64,
    /// Points held back as a buffer against estimation error
    #[serde(default = "default_safety_margin")]
    pub safety_margin: f64,
}

fn default_max_cost() -> f64 {
    2000.0
}

fn default_restore_rate() -> f64 {
    100.0
}

fn default_safety_margin() -> f64 {
    100.0
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            max_cost: default_max_cost(),
            restore_rate: default_restore_rate(),
            safety_margin: default_safety_margin(),
        }
    }
}

impl LimiterConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.max_cost > 0.0) {
            return Err(Error::config("limiter.max_cost must be positive"));
        }
        if !(self.restore_rate > 0.0) {
            return Err(Error::config("limiter.restore_rate must be positive"));
        }
        if self.safety_margin < 0.0 || self.safety_margin >= self.max_cost {
            return Err(Error::config(
                "limiter.safety_margin must be in [0, max_cost)",
            ));
        }
        Ok(())
    }

    /// Points a single request can ever be granted.
    pub fn usable_capacity(&self) -> f64 {
        self.max_cost - self.safety_margin
    }
}
