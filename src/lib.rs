//! # readmere-rs
//!
//! Backend that resurrects stale documentation. It drives three remote MCP
//! agents (repository analyzer, code reader, documentation generator) through
//! a fixed pipeline and returns a scored README.
//!
//! ## Modules
//!
//! - `client`: pooled MCP connections, timeouts and retry policy
//! - `decode`: tool payload extraction and lenient JSON salvage
//! - `pipeline`: the orchestrator, progress reporting and fallback synthesis
//! - `server`: HTTP API with server-sent progress events
//! - `github`: publishing a README back as a pull request

/// Tool client and connection pool
pub mod client;
/// Runtime settings
pub mod config;
/// Tool response decoding
pub mod decode;
pub mod error;
/// GitHub URL parsing and pull request publishing
pub mod github;
pub mod model;
/// README orchestration
pub mod pipeline;
/// Markdown helpers
pub mod readme;
/// HTTP API
pub mod server;
/// Tool catalogue and typed requests
pub mod tools;

pub use client::{ToolCaller, ToolClient};
pub use error::{DecodeError, PipelineError, ResponseError, ToolError};
pub use pipeline::{GenerationRequest, GenerationResult, Orchestrator, ProgressSink};
