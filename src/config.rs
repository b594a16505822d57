//! Runtime settings shared by the library and the binary.
//!
//! The binary fills these from `clap` flags; library users can start from
//! [`Default`] and override what they need.

use std::time::Duration;

use crate::tools::{Endpoint, ToolClass};

/// Base URLs of the three agents, without the transport path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    pub repo_analyzer: String,
    pub code_reader: String,
    pub doc_generator: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            repo_analyzer: "http://localhost:3002".to_string(),
            code_reader: "http://localhost:3003".to_string(),
            doc_generator: "http://localhost:3004".to_string(),
        }
    }
}

impl EndpointConfig {
    pub fn url(&self, endpoint: Endpoint) -> &str {
        match endpoint {
            Endpoint::RepoAnalyzer => &self.repo_analyzer,
            Endpoint::CodeReader => &self.code_reader,
            Endpoint::DocGenerator => &self.doc_generator,
        }
    }
}

/// Per-call time limits by tool class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub lookup: Duration,
    pub generation: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            lookup: Duration::from_secs(60),
            generation: Duration::from_secs(120),
        }
    }
}

impl Timeouts {
    pub fn for_class(&self, class: ToolClass) -> Duration {
        match class {
            ToolClass::Lookup => self.lookup,
            ToolClass::Generation => self.generation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::Tool;

    #[test]
    fn llm_calls_get_the_longer_limit() {
        let timeouts = Timeouts::default();
        assert_eq!(
            timeouts.for_class(Tool::EnhanceReadme.class()),
            Duration::from_secs(120)
        );
        assert_eq!(
            timeouts.for_class(Tool::RepoMetadata.class()),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn endpoints_resolve_to_their_own_url() {
        let config = EndpointConfig::default();
        assert!(config.url(Endpoint::CodeReader).ends_with(":3003"));
        assert!(config.url(Endpoint::DocGenerator).ends_with(":3004"));
    }
}
