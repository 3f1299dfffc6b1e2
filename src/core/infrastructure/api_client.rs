//! HTTP JSON-RPC implementation of the RPC gateway.

use crate::core::{
    domain::{
        error::{ConvergeError, ConvergeResult, ValidationError},
        model::converge_config::ConvergeConfig,
        value_object::{ApiKey, EndpointUrl, validate_api_key},
    },
    infrastructure::rpc_gateway::RpcGateway,
};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota};
use reqwest::{Client, StatusCode, header::AUTHORIZATION};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

const JOB_QUERY_METHOD: &str = "core.get_jobs";

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: &'a Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    #[serde(default)]
    code: i64,
    message: String,
}

/// A job record as returned by `core.get_jobs`.
#[derive(Debug, Deserialize)]
struct JobRecord {
    id: u64,
    state: String,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Gateway that posts JSON-RPC 2.0 requests to the management API over HTTP.
///
/// Each request carries the API key as a bearer token. `call_and_wait` reads
/// the job id returned by the call and polls `core.get_jobs` until the job
/// ends. An optional client-side rate limit applies to every request,
/// including job polls.
#[derive(Debug)]
pub struct HttpRpcGateway {
    http_client: Client,
    endpoint: EndpointUrl,
    api_key: ApiKey,
    config: Arc<ConvergeConfig>,
    rate_limiter: Option<Arc<DefaultDirectRateLimiter>>,
    next_id: AtomicU64,
}

/// Builder for HttpRpcGateway configuration
#[derive(Debug, Default)]
pub struct HttpRpcGatewayBuilder {
    endpoint: Option<String>,
    api_key: Option<String>,
    accept_invalid_certs: bool,
    config: Option<ConvergeConfig>,
}

impl HttpRpcGatewayBuilder {
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Accept self-signed certificates. Use only against trusted hosts.
    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    pub fn config(mut self, config: ConvergeConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Validates the settings and builds the gateway.
    ///
    /// # Errors
    /// Returns `ConvergeError::Validation` for a missing or malformed endpoint,
    /// API key or rate limit, and `ConvergeError::Connection` if the HTTP
    /// client cannot be built.
    pub fn build(self) -> ConvergeResult<HttpRpcGateway> {
        let endpoint = EndpointUrl::parse(&self.endpoint.ok_or_else(|| {
            ValidationError::Field {
                field: "endpoint".to_string(),
                message: "Endpoint is required".to_string(),
            }
        })?)?;

        let api_key = self.api_key.ok_or_else(|| ValidationError::Field {
            field: "api_key".to_string(),
            message: "API key is required".to_string(),
        })?;
        validate_api_key(&api_key)?;

        let config = self.config.unwrap_or_default();
        let rate_limiter = match config.rate_limit {
            Some(rl) => {
                let per_second = NonZeroU32::new(rl.requests_per_second).ok_or_else(|| {
                    ValidationError::ConstraintViolation(
                        "requests_per_second must be greater than zero".to_string(),
                    )
                })?;
                let burst = NonZeroU32::new(rl.burst_size).ok_or_else(|| {
                    ValidationError::ConstraintViolation(
                        "burst_size must be greater than zero".to_string(),
                    )
                })?;
                let quota = Quota::per_second(per_second).allow_burst(burst);
                Some(Arc::new(DefaultDirectRateLimiter::direct(quota)))
            }
            None => None,
        };

        let http_client = Client::builder()
            .danger_accept_invalid_certs(self.accept_invalid_certs)
            .build()
            .map_err(|e| ConvergeError::Connection(e.to_string()))?;

        Ok(HttpRpcGateway {
            http_client,
            endpoint,
            api_key: ApiKey::new_unchecked(api_key),
            config: Arc::new(config),
            rate_limiter,
            next_id: AtomicU64::new(1),
        })
    }
}

impl HttpRpcGateway {
    /// Creates a new builder for HttpRpcGateway configuration
    pub fn builder() -> HttpRpcGatewayBuilder {
        HttpRpcGatewayBuilder::default()
    }

    /// Returns the base URL of the management API.
    pub fn endpoint(&self) -> &EndpointUrl {
        &self.endpoint
    }

    /// Sends one JSON-RPC request and unwraps its result.
    async fn execute_request(&self, method: &str, params: &Value) -> ConvergeResult<Value> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }

        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        debug!(method, id = request.id, "sending rpc request");

        let response = self
            .http_client
            .post(self.endpoint.rpc_url())
            .header(AUTHORIZATION, self.api_key.as_bearer_header())
            .json(&request)
            .send()
            .await
            .map_err(|e| ConvergeError::Connection(format!("HTTP request failed: {}", e)))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(ConvergeError::Authentication(
                    "API key was rejected".to_string(),
                ));
            }
            status if !status.is_success() => {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown".to_string());
                return Err(ConvergeError::Connection(format!(
                    "API error ({}): {}",
                    status, error_text
                )));
            }
            _ => {}
        }

        let body = response
            .json::<RpcResponse>()
            .await
            .map_err(|e| ConvergeError::Parse(format!("Failed to parse response: {}", e)))?;

        if let Some(error) = body.error {
            return Err(ConvergeError::Rpc {
                method: method.to_string(),
                message: format!("[{}] {}", error.code, error.message),
            });
        }
        Ok(body.result.unwrap_or(Value::Null))
    }

    /// Polls a job until it leaves its running states.
    async fn wait_for_job(&self, job_id: u64) -> ConvergeResult<Value> {
        let filter = json!([[["id", "=", job_id]]]);
        loop {
            let raw = self.execute_request(JOB_QUERY_METHOD, &filter).await?;
            let mut jobs: Vec<JobRecord> = serde_json::from_value(raw)?;
            let job = jobs
                .pop()
                .ok_or_else(|| ConvergeError::NotFound(format!("job {} not found", job_id)))?;

            match job.state.as_str() {
                "SUCCESS" => {
                    info!(job_id = job.id, "job finished");
                    return Ok(job.result.unwrap_or(Value::Null));
                }
                "FAILED" | "ABORTED" => {
                    return Err(ConvergeError::Job {
                        id: job.id,
                        state: job.state,
                        message: job.error.unwrap_or_else(|| "no error reported".to_string()),
                    });
                }
                state => {
                    debug!(job_id = job.id, state, "job still running");
                    tokio::time::sleep(self.config.job_poll_interval).await;
                }
            }
        }
    }
}

#[async_trait]
impl RpcGateway for HttpRpcGateway {
    async fn call(&self, method: &str, params: Value) -> ConvergeResult<Value> {
        self.execute_request(method, &params).await
    }

    async fn call_and_wait(&self, method: &str, params: Value) -> ConvergeResult<Value> {
        let raw = self.execute_request(method, &params).await?;
        let job_id = raw.as_u64().ok_or_else(|| {
            ConvergeError::Parse(format!("'{}' did not return a job id: {}", method, raw))
        })?;
        info!(method, job_id, "waiting for job");
        self.wait_for_job(job_id).await
    }
}
