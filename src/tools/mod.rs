//! The fixed set of remote tools the pipeline can call.
//!
//! Tool identity, endpoint and timeout class are all resolved at compile time;
//! only [`Tool::from_str`] deals with free-form names.

pub mod requests;

use std::fmt;
use std::str::FromStr;

use crate::error::ToolError;

pub use requests::ToolRequest;

/// Remote agents hosting the tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Endpoint {
    RepoAnalyzer,
    CodeReader,
    DocGenerator,
}

impl Endpoint {
    pub const ALL: [Self; 3] = [Self::RepoAnalyzer, Self::CodeReader, Self::DocGenerator];

    pub const fn name(self) -> &'static str {
        match self {
            Self::RepoAnalyzer => "repo-analyzer",
            Self::CodeReader => "code-reader",
            Self::DocGenerator => "doc-generator",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Timeout class of a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolClass {
    /// GitHub reads and local heuristics.
    Lookup,
    /// LLM-backed calls.
    Generation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    RepoMetadata,
    AnalyzeRepository,
    IdentifyImportantFiles,
    CommunityInsights,
    ReadFiles,
    ExtractSignatures,
    ExtractCommands,
    SmartChunk,
    GenerateReadme,
    ValidateReadme,
    EnhanceReadme,
}

impl Tool {
    pub const ALL: [Self; 11] = [
        Self::RepoMetadata,
        Self::AnalyzeRepository,
        Self::IdentifyImportantFiles,
        Self::CommunityInsights,
        Self::ReadFiles,
        Self::ExtractSignatures,
        Self::ExtractCommands,
        Self::SmartChunk,
        Self::GenerateReadme,
        Self::ValidateReadme,
        Self::EnhanceReadme,
    ];

    /// Wire name sent in `tools/call`.
    pub const fn name(self) -> &'static str {
        match self {
            Self::RepoMetadata => "get_repo_metadata",
            Self::AnalyzeRepository => "analyze_repository",
            Self::IdentifyImportantFiles => "identify_important_files",
            Self::CommunityInsights => "get_community_insights",
            Self::ReadFiles => "read_files",
            Self::ExtractSignatures => "extract_signatures",
            Self::ExtractCommands => "extract_commands",
            Self::SmartChunk => "smart_chunk",
            Self::GenerateReadme => "generate_readme",
            Self::ValidateReadme => "validate_readme",
            Self::EnhanceReadme => "enhance_readme",
        }
    }

    pub const fn endpoint(self) -> Endpoint {
        match self {
            Self::RepoMetadata
            | Self::AnalyzeRepository
            | Self::IdentifyImportantFiles
            | Self::CommunityInsights => Endpoint::RepoAnalyzer,
            Self::ReadFiles
            | Self::ExtractSignatures
            | Self::ExtractCommands
            | Self::SmartChunk => Endpoint::CodeReader,
            Self::GenerateReadme | Self::ValidateReadme | Self::EnhanceReadme => {
                Endpoint::DocGenerator
            }
        }
    }

    pub const fn class(self) -> ToolClass {
        match self.endpoint() {
            Endpoint::DocGenerator => ToolClass::Generation,
            Endpoint::RepoAnalyzer | Endpoint::CodeReader => ToolClass::Lookup,
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Tool {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tool| tool.name() == s)
            .ok_or_else(|| ToolError::UnknownTool(s.to_string()))
    }
}
