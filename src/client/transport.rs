//! MCP sessions over HTTP, via `rmcp`.
//!
//! The streamable HTTP transport is tried first; agents that only speak the
//! older SSE transport are reached through the fallback.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rmcp::model::{CallToolRequestParam, JsonObject};
use rmcp::ServiceExt;
use rmcp::service::{Peer, RoleClient, RunningService};
use rmcp::transport::{SseClientTransport, StreamableHttpClientTransport};
use tokio::sync::Mutex;

use crate::client::pool::{Connector, ToolConnection};
use crate::config::EndpointConfig;
use crate::decode::ToolResponse;
use crate::error::ToolError;
use crate::tools::{Endpoint, Tool};

const STREAMABLE_PATH: &str = "/mcp";
const SSE_PATH: &str = "/sse";

/// Opens `rmcp` client sessions against the configured agent URLs.
pub struct McpConnector {
    endpoints: EndpointConfig,
    connect_timeout: Duration,
}

impl McpConnector {
    pub fn new(endpoints: EndpointConfig) -> Self {
        Self {
            endpoints,
            connect_timeout: Duration::from_secs(15),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    async fn connect_streamable(&self, base: &str) -> Result<McpSession, String> {
        let transport = StreamableHttpClientTransport::from_uri(format!("{base}{STREAMABLE_PATH}"));
        let service = tokio::time::timeout(self.connect_timeout, ().serve(transport))
            .await
            .map_err(|_| "handshake timed out".to_string())?
            .map_err(|e| e.to_string())?;
        Ok(McpSession::new(service, "streamable-http"))
    }

    async fn connect_sse(&self, base: &str) -> Result<McpSession, String> {
        let handshake = async {
            let transport = SseClientTransport::start(format!("{base}{SSE_PATH}"))
                .await
                .map_err(|e| e.to_string())?;
            ().serve(transport).await.map_err(|e| e.to_string())
        };
        let service = tokio::time::timeout(self.connect_timeout, handshake)
            .await
            .map_err(|_| "handshake timed out".to_string())??;
        Ok(McpSession::new(service, "sse"))
    }
}

#[async_trait]
impl Connector for McpConnector {
    async fn connect(&self, endpoint: Endpoint) -> Result<Arc<dyn ToolConnection>, ToolError> {
        let base = self.endpoints.url(endpoint).trim_end_matches('/');

        let streamable_err = match self.connect_streamable(base).await {
            Ok(session) => return Ok(Arc::new(session)),
            Err(e) => e,
        };
        tracing::warn!(
            %endpoint,
            error = %streamable_err,
            "streamable HTTP handshake failed, falling back to SSE"
        );

        match self.connect_sse(base).await {
            Ok(session) => Ok(Arc::new(session)),
            Err(sse_err) => Err(ToolError::Connect {
                endpoint,
                message: format!("streamable HTTP: {streamable_err}; SSE: {sse_err}"),
            }),
        }
    }
}

/// One running `rmcp` client session.
struct McpSession {
    peer: Peer<RoleClient>,
    service: Mutex<Option<RunningService<RoleClient, ()>>>,
    transport: &'static str,
}

impl McpSession {
    fn new(service: RunningService<RoleClient, ()>, transport: &'static str) -> Self {
        tracing::debug!(transport, "tool session established");
        Self {
            peer: service.peer().clone(),
            service: Mutex::new(Some(service)),
            transport,
        }
    }
}

#[async_trait]
impl ToolConnection for McpSession {
    async fn call(&self, tool: Tool, arguments: JsonObject) -> Result<ToolResponse, ToolError> {
        let result = self
            .peer
            .call_tool(CallToolRequestParam {
                name: tool.name().into(),
                arguments: Some(arguments),
            })
            .await
            .map_err(|e| ToolError::Transport {
                tool,
                message: e.to_string(),
            })?;

        // Re-read through the wire shape so decoding stays independent of rmcp.
        serde_json::to_value(&result)
            .and_then(serde_json::from_value)
            .map_err(|e| ToolError::Transport {
                tool,
                message: format!("unreadable tool result: {e}"),
            })
    }

    async fn close(&self) {
        let Some(service) = self.service.lock().await.take() else {
            return;
        };
        if let Err(e) = service.cancel().await {
            tracing::debug!(
                transport = self.transport,
                error = %e,
                "tool session did not shut down cleanly"
            );
        }
    }
}
