//! Request executor - one outbound call per invocation.
//!
//! Applies auth injection, body encoding, the per-tool timeout and the retry
//! policy. Remote failures are folded into the returned [`ExecutionResult`];
//! only pre-call problems surface as `Err` from [`RequestExecutor::prepare`].

use bytes::Bytes;
use chrono::Utc;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::definition::AuthInjection;
use crate::tools::encoding::{self, PreparedRequest, RequestBody};
use crate::tools::instance::ToolInstance;
use crate::tools::result::{ExecutionError, ExecutionResult};
use crate::tools::retry::{backoff_delay, parse_retry_after};
use crate::types::{Error, ExecutorConfig, Result, ValidationMode};

/// Longest remote error body kept in a result message.
const MAX_ERROR_BODY_CHARS: usize = 512;

/// A completed 2xx response.
#[derive(Debug)]
struct Completed {
    output: Value,
    status: u16,
}

/// A failed attempt and any server hint about when to retry.
#[derive(Debug)]
struct AttemptFailure {
    error: Error,
    retry_after: Option<Duration>,
}

impl From<Error> for AttemptFailure {
    fn from(error: Error) -> Self {
        Self {
            error,
            retry_after: None,
        }
    }
}

/// Outbound HTTP executor shared by every tenant.
#[derive(Debug, Clone)]
pub struct RequestExecutor {
    client: reqwest::Client,
    config: ExecutorConfig,
}

impl RequestExecutor {
    pub fn new(config: ExecutorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    /// Underlying client, shared with the health monitor.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Validate input against `inputSchema` and shape the request.
    pub fn prepare(&self, instance: &ToolInstance, input: &Value) -> Result<PreparedRequest> {
        instance.validate_input(input)?;
        encoding::prepare(instance.definition(), input)
    }

    /// Run the call with retries. Never fails; failures land in the result.
    pub async fn send(
        &self,
        instance: &ToolInstance,
        prepared: &PreparedRequest,
        input: Value,
        cancel: &CancellationToken,
    ) -> ExecutionResult {
        let definition = instance.definition();
        let timestamp = Utc::now();
        let started = Instant::now();
        let timeout = Duration::from_millis(definition.timeout);
        let max_attempts = definition.retries.saturating_add(1);
        let mut attempts: u32 = 0;

        let outcome: std::result::Result<Completed, Error> = loop {
            // Counted on first poll, so a call cancelled before sending reports none.
            let attempt = async {
                attempts += 1;
                tokio::time::timeout(timeout, self.attempt(instance, prepared)).await
            };
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    break Err(Error::cancelled(format!("{} cancelled by caller", instance.id())));
                }
                r = attempt => match r {
                    Ok(inner) => inner,
                    Err(_) => Err(AttemptFailure::from(Error::timeout(format!(
                        "{} did not respond within {}ms",
                        instance.id(),
                        definition.timeout
                    )))),
                },
            };

            match result {
                Ok(completed) => break Ok(completed),
                Err(failure) if failure.error.is_retryable() && attempts < max_attempts => {
                    let delay = backoff_delay(&self.config, attempts - 1, failure.retry_after);
                    tracing::warn!(
                        "tool_attempt_retry: tool={} attempt={}/{} delay_ms={} error={}",
                        instance.id(),
                        attempts,
                        max_attempts,
                        delay.as_millis(),
                        failure.error
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            break Err(Error::cancelled(format!(
                                "{} cancelled during backoff",
                                instance.id()
                            )));
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(failure) => break Err(failure.error),
            }
        };

        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let mut result = ExecutionResult {
            tool_id: instance.id().to_string(),
            input,
            output: None,
            error: None,
            timestamp,
            duration_ms,
            attempts,
            status_code: None,
            cached: false,
        };

        match outcome {
            Ok(completed) => {
                result.status_code = Some(completed.status);
                let violations = instance.output_violations(&completed.output);
                if violations.is_empty() {
                    result.output = Some(completed.output);
                } else {
                    tracing::warn!(
                        "tool_output_mismatch: tool={} violations={} mode={:?}",
                        instance.id(),
                        violations.len(),
                        self.config.validation_mode
                    );
                    if self.config.validation_mode == ValidationMode::Lenient {
                        result.output = Some(completed.output);
                    }
                    result.error = Some(ExecutionError::output_mismatch(violations));
                }
            }
            Err(err) => {
                if let Error::Remote { status, .. } = &err {
                    result.status_code = Some(*status);
                }
                tracing::debug!(
                    "tool_call_failed: tool={} attempts={} error={}",
                    instance.id(),
                    attempts,
                    err
                );
                result.error = Some(ExecutionError::from(&err));
            }
        }
        result
    }

    /// One attempt: build, send, classify.
    async fn attempt(
        &self,
        instance: &ToolInstance,
        prepared: &PreparedRequest,
    ) -> std::result::Result<Completed, AttemptFailure> {
        let definition = instance.definition();

        let mut builder = self
            .client
            .request(definition.method.to_reqwest(), &prepared.url)
            .headers(instance.headers().clone());

        let mut query = prepared.query.clone();
        match instance.auth() {
            AuthInjection::Header { name, value } => {
                builder = builder.header(name.as_str(), value.as_str());
            }
            AuthInjection::Query { name, value } => query.push((name.clone(), value.clone())),
            AuthInjection::None => {}
        }
        if !query.is_empty() {
            builder = builder.query(&query);
        }

        builder = match &prepared.body {
            Some(RequestBody::Json(value)) => builder.json(value),
            Some(RequestBody::Form(pairs)) => builder.form(pairs),
            Some(RequestBody::Raw(text)) => builder.body(text.clone()),
            None => builder,
        };

        let mut request = builder
            .build()
            .map_err(|e| Error::validation(format!("cannot build request: {}", e)))?;
        if prepared.body.is_some() {
            let content_type = HeaderValue::from_str(definition.effective_content_type())
                .map_err(|_| Error::validation("contentType is not a valid header value"))?;
            request.headers_mut().insert(CONTENT_TYPE, content_type);
        }

        let response = self.client.execute(request).await.map_err(classify_transport)?;

        let status = response.status().as_u16();
        let retry_after = parse_retry_after(response.headers());
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map_or(false, |ct| ct.contains("json"));
        let body = response.bytes().await.map_err(classify_transport)?;

        if !(200..300).contains(&status) {
            return Err(AttemptFailure {
                error: Error::remote(status, truncate(&String::from_utf8_lossy(&body))),
                retry_after,
            });
        }

        Ok(Completed {
            output: decode_body(&body, is_json),
            status,
        })
    }
}

fn classify_transport(err: reqwest::Error) -> AttemptFailure {
    let error = if err.is_timeout() {
        Error::timeout(err.to_string())
    } else {
        Error::transient(err.to_string())
    };
    AttemptFailure::from(error)
}

/// JSON when declared or parseable, otherwise the text as a JSON string.
fn decode_body(body: &Bytes, is_json: bool) -> Value {
    if body.is_empty() {
        return Value::Null;
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(value) => value,
        Err(e) => {
            if is_json {
                tracing::debug!("response_json_invalid: error={}", e);
            }
            Value::String(String::from_utf8_lossy(body).into_owned())
        }
    }
}

fn truncate(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }
    match trimmed.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
