//! Tool client: resolves a tool to its endpoint, borrows the pooled
//! connection, and applies timeouts and the retry policy.
//!
//! Callers only ever see the final, already-retried outcome.

pub mod pool;
pub mod retry;
pub mod transport;

use std::sync::Arc;

use async_trait::async_trait;
use rmcp::model::JsonObject;
use tokio_util::sync::CancellationToken;

use crate::config::Timeouts;
use crate::decode::extract_text;
use crate::error::{ResponseError, ToolError};
use crate::tools::{Endpoint, Tool};

pub use pool::{ConnectionPool, Connector, ToolConnection};
pub use retry::{ErrorClassifier, FailureClass, ProviderPhraseClassifier, RetryPolicy};
pub use transport::McpConnector;

/// Anything that can run a tool and hand back its text payload.
///
/// The orchestrator depends on this trait only, so tests can script tool
/// behavior without a network.
#[async_trait]
pub trait ToolCaller: Send + Sync {
    async fn call_tool(
        &self,
        tool: Tool,
        arguments: JsonObject,
        cancel: &CancellationToken,
    ) -> Result<String, ToolError>;
}

pub struct ToolClient {
    pool: Arc<ConnectionPool>,
    policy: RetryPolicy,
    timeouts: Timeouts,
}

impl ToolClient {
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self {
            pool,
            policy: RetryPolicy::default(),
            timeouts: Timeouts::default(),
        }
    }

    /// Client over `rmcp` sessions opened by `connector`.
    pub fn connect(connector: McpConnector) -> Self {
        Self::new(Arc::new(ConnectionPool::new(Arc::new(connector))))
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Invoke a tool by its wire name. Unknown names fail without a call.
    pub async fn call_tool_by_name(
        &self,
        name: &str,
        arguments: JsonObject,
        cancel: &CancellationToken,
    ) -> Result<String, ToolError> {
        let tool: Tool = name.parse()?;
        self.call_tool(tool, arguments, cancel).await
    }

    /// Close every pooled connection.
    pub async fn cleanup(&self) {
        self.pool.close_all().await;
    }

    async fn call_with_retry(
        &self,
        tool: Tool,
        arguments: JsonObject,
        cancel: &CancellationToken,
    ) -> Result<String, ToolError> {
        let mut attempt = 1u32;
        let mut transient_retries = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(ToolError::Cancelled);
            }

            let endpoint = tool.endpoint();
            let connection = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ToolError::Cancelled),
                connection = self.pool.get(endpoint) => connection,
            };
            let (err, used) = match connection {
                Ok(connection) => match self.attempt(tool, &connection, &arguments, cancel).await {
                    Ok(text) => return Ok(text),
                    Err(e) => (e, Some(connection)),
                },
                Err(e) => (e, None),
            };
            if err.is_terminal() {
                return Err(err);
            }
            if err.invalidates_connection() {
                self.discard(endpoint, used.as_ref()).await;
            }

            let message = failure_detail(&err);
            match self.policy.classify(&message) {
                FailureClass::QuotaExhausted => {
                    tracing::error!(%tool, error = %message, "quota exhausted, not retrying");
                    return Err(ToolError::QuotaExhausted { tool, message });
                }
                FailureClass::RateLimited { retry_after } => {
                    if attempt >= self.policy.max_attempts {
                        tracing::error!(%tool, attempt, "rate limited, giving up");
                        return Err(ToolError::RateLimited { tool, message });
                    }
                    let wait = self.policy.backoff(attempt, retry_after);
                    tracing::warn!(
                        %tool,
                        attempt,
                        wait_secs = wait.as_secs_f64(),
                        "rate limited, backing off"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(ToolError::Cancelled),
                        _ = tokio::time::sleep(wait) => {}
                    }
                    attempt += 1;
                }
                FailureClass::Transient => {
                    if transient_retries >= self.policy.transient_retries {
                        return Err(err);
                    }
                    transient_retries += 1;
                    self.discard(endpoint, used.as_ref()).await;
                    tracing::warn!(
                        %tool,
                        error = %err,
                        "tool call failed, retrying on a fresh connection"
                    );
                }
            }
        }
    }

    /// One call on `connection`, bounded by the class timeout.
    async fn attempt(
        &self,
        tool: Tool,
        connection: &Arc<dyn ToolConnection>,
        arguments: &JsonObject,
        cancel: &CancellationToken,
    ) -> Result<String, ToolError> {
        let limit = self.timeouts.for_class(tool.class());
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ToolError::Cancelled),
            outcome = tokio::time::timeout(limit, connection.call(tool, arguments.clone())) => outcome,
        };

        outcome
            .unwrap_or(Err(ToolError::Timeout { tool, after: limit }))
            .and_then(|response| {
                extract_text(&response).map_err(|source| ToolError::Response { tool, source })
            })
    }

    async fn discard(&self, endpoint: Endpoint, connection: Option<&Arc<dyn ToolConnection>>) {
        if let Some(connection) = connection {
            self.pool.invalidate(endpoint, connection).await;
        }
    }
}

#[async_trait]
impl ToolCaller for ToolClient {
    async fn call_tool(
        &self,
        tool: Tool,
        arguments: JsonObject,
        cancel: &CancellationToken,
    ) -> Result<String, ToolError> {
        tracing::debug!(%tool, endpoint = %tool.endpoint(), "calling tool");
        self.call_with_retry(tool, arguments, cancel).await
    }
}

/// The message a provider put in the failure, without our own framing.
fn failure_detail(err: &ToolError) -> String {
    match err {
        ToolError::Response {
            source: ResponseError::Tool(message),
            ..
        }
        | ToolError::Transport { message, .. }
        | ToolError::Connect { message, .. } => message.clone(),
        other => other.to_string(),
    }
}
