//! GraphQL client for the supplier API.

use std::time::{Duration, Instant};

use reqwest::header::RETRY_AFTER;
use serde_json::{json, Value};
use tracing::{debug, warn};

use cost_limiter::{CostEnvelope, SharedRateLimiter};
use sync_core::{Error, Result};
use telemetry::{health, metrics};

use crate::config::SupplierConfig;
use crate::costs::{CostTable, Operation};
use crate::error::SupplierError;

/// Successful query result.
#[derive(Debug, Clone)]
pub struct SupplierResponse {
    /// The `data` member of the response body
    pub data: Value,
    /// Cost metadata, if the supplier reported any
    pub cost: Option<CostEnvelope>,
    /// Time spent waiting for limiter capacity before sending
    pub waited: Duration,
}

/// Response body split into cost metadata and the query result.
#[derive(Debug)]
pub struct ParsedResponse {
    pub cost: Option<CostEnvelope>,
    pub result: std::result::Result<Value, SupplierError>,
}

/// Rate-limited supplier client. Cheap to clone; clones share the limiter.
#[derive(Clone)]
pub struct SupplierClient {
    config: SupplierConfig,
    http_client: reqwest::Client,
    costs: CostTable,
    limiter: SharedRateLimiter,
}

impl SupplierClient {
    pub fn new(config: SupplierConfig, limiter: SharedRateLimiter) -> Result<Self> {
        let costs = CostTable::with_overrides(&config.cost_overrides)?;
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
            costs,
            limiter,
        })
    }

    pub fn config(&self) -> &SupplierConfig {
        &self.config
    }

    pub fn limiter(&self) -> &SharedRateLimiter {
        &self.limiter
    }

    /// Runs one query, waiting for limiter capacity first and feeding the
    /// reported cost back afterwards.
    pub async fn query(
        &self,
        op: Operation,
        query: &str,
        variables: Value,
    ) -> std::result::Result<SupplierResponse, SupplierError> {
        let estimated = self.costs.estimate(op);
        let waited = self.limiter.wait_for_capacity(estimated).await;

        let mut request = self
            .http_client
            .post(&self.config.base_url)
            .json(&json!({ "query": query, "variables": variables }));
        if let Some(token) = &self.config.access_token {
            request = request.bearer_auth(token);
        }

        metrics().upstream_requests.inc();
        let started = Instant::now();
        let result = self.send(request, estimated).await;
        metrics()
            .upstream_latency_ms
            .observe(started.elapsed().as_millis() as u64);

        match result {
            Ok((data, cost)) => {
                health().upstream.set_healthy();
                debug!(
                    operation = op.name(),
                    estimated_cost = estimated,
                    waited_ms = waited.as_millis() as u64,
                    "Supplier query succeeded"
                );
                Ok(SupplierResponse {
                    data,
                    cost,
                    waited,
                })
            }
            Err(err) => {
                if err.is_throttle() {
                    metrics().upstream_throttled.inc();
                } else {
                    metrics().upstream_errors.inc();
                }
                if err.is_retryable() && !err.is_throttle() {
                    health().upstream.set_unhealthy(err.to_string());
                }
                warn!(operation = op.name(), error = %err, "Supplier query failed");
                Err(err)
            }
        }
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        estimated: f64,
    ) -> std::result::Result<(Value, Option<CostEnvelope>), SupplierError> {
        let response = request.send().await.map_err(SupplierError::from_transport)?;
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let body = response.text().await.map_err(SupplierError::from_transport)?;

        let parsed = parse_response(status, retry_after, &body);
        match &parsed.cost {
            Some(envelope) => self.limiter.observe(envelope, estimated),
            None => debug!(status, "Supplier response carried no cost metadata"),
        }

        match parsed.result {
            Ok(data) => Ok((data, parsed.cost)),
            Err(SupplierError::Throttled {
                retry_after_secs: None,
            }) => Err(SupplierError::Throttled {
                retry_after_secs: Some(self.throttle_wait_secs(estimated)),
            }),
            Err(err) => Err(err),
        }
    }

    /// Seconds until the limiter could cover `cost` again.
    fn throttle_wait_secs(&self, cost: f64) -> u64 {
        self.limiter
            .estimate_wait(cost)
            .map(|wait| wait.as_secs_f64().ceil() as u64)
            .unwrap_or(1)
            .max(1)
    }
}

/// Parses a delta-seconds `Retry-After` value. HTTP dates are ignored.
pub fn parse_retry_after(value: &str) -> Option<u64> {
    value.trim().parse().ok()
}

/// Classifies a raw supplier response.
pub fn parse_response(status: u16, retry_after: Option<u64>, body: &str) -> ParsedResponse {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let cost = parsed.as_ref().and_then(CostEnvelope::from_response);

    if !(200..300).contains(&status) {
        return ParsedResponse {
            cost,
            result: Err(SupplierError::from_status(status, retry_after)),
        };
    }

    let Some(mut body) = parsed else {
        return ParsedResponse {
            cost,
            result: Err(SupplierError::Malformed("response body is not JSON".into())),
        };
    };

    let query_error = body
        .get("errors")
        .and_then(Value::as_array)
        .filter(|errors| !errors.is_empty())
        .map(|errors| classify_errors(errors, retry_after));

    let result = match query_error {
        Some(err) => Err(err),
        None => match body.get_mut("data").map(Value::take) {
            Some(data) if !data.is_null() => Ok(data),
            _ => Err(SupplierError::Malformed("response has no data".into())),
        },
    };

    ParsedResponse { cost, result }
}

fn classify_errors(errors: &[Value], retry_after: Option<u64>) -> SupplierError {
    let throttled = errors.iter().any(|e| {
        e.pointer("/extensions/code").and_then(Value::as_str) == Some("THROTTLED")
    });
    if throttled {
        return SupplierError::Throttled {
            retry_after_secs: retry_after,
        };
    }

    let messages: Vec<&str> = errors
        .iter()
        .filter_map(|e| e.get("message").and_then(Value::as_str))
        .collect();
    SupplierError::GraphQl(if messages.is_empty() {
        "unknown error".to_string()
    } else {
        messages.join("; ")
    })
}
