use std::time::Duration;

use crate::pipeline::progress::Stage;
use crate::tools::{Endpoint, Tool};

/// Failure turning a raw tool response into text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResponseError {
    #[error("empty response")]
    Empty,

    #[error("tool error: {0}")]
    Tool(String),
}

/// Failure turning tool text into a structured value.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// No parse strategy produced valid JSON; carries the first parse error.
    #[error("malformed JSON: {0}")]
    Malformed(#[source] serde_json::Error),

    /// Valid JSON that does not match the expected shape.
    #[error("unexpected JSON shape: {0}")]
    Shape(#[source] serde_json::Error),
}

/// Final, already-retried outcome of a tool invocation.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("could not connect to {endpoint}: {message}")]
    Connect { endpoint: Endpoint, message: String },

    #[error("{tool} call failed: {message}")]
    Transport { tool: Tool, message: String },

    #[error("{tool} timed out after {}s", .after.as_secs())]
    Timeout { tool: Tool, after: Duration },

    #[error("{tool} returned {source}")]
    Response {
        tool: Tool,
        #[source]
        source: ResponseError,
    },

    #[error("{tool} is rate limited: {message}")]
    RateLimited { tool: Tool, message: String },

    #[error("{message}")]
    QuotaExhausted { tool: Tool, message: String },

    #[error("tool call cancelled")]
    Cancelled,
}

impl ToolError {
    /// Errors that no amount of retrying can fix.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::UnknownTool(_) | Self::QuotaExhausted { .. } | Self::Cancelled
        )
    }

    /// Errors caused by the connection itself rather than the tool behind it.
    pub fn invalidates_connection(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. } | Self::Transport { .. } | Self::Timeout { .. }
        )
    }
}

/// Error returned by a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid repository URL: {0}")]
    InvalidInput(String),

    #[error("{stage} step failed: {source}")]
    Tool {
        stage: Stage,
        #[source]
        source: ToolError,
    },

    #[error("{stage} step could not decode {tool} output: {source}")]
    Decode {
        stage: Stage,
        tool: Tool,
        #[source]
        source: DecodeError,
    },

    #[error("generation cancelled")]
    Cancelled,
}

impl PipelineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Cancelled
                | Self::Tool {
                    source: ToolError::Cancelled,
                    ..
                }
        )
    }
}
