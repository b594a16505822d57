use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::github::is_repository_url;
use crate::model::{
    CommunityInsights, FileContent, FileSignatures, QualityReport, RepoAnalysis, RepoMetadata,
    VerifiedCommands,
};

/// README length and depth preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Style {
    Minimal,
    #[default]
    Standard,
    Detailed,
}

impl Style {
    /// Output token budget handed to the generator.
    pub const fn token_limit(self) -> u32 {
        match self {
            Self::Minimal => 3000,
            Self::Standard => 6000,
            Self::Detailed => 8000,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Standard => "standard",
            Self::Detailed => "detailed",
        }
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Style {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minimal" => Ok(Self::Minimal),
            "standard" => Ok(Self::Standard),
            "detailed" => Ok(Self::Detailed),
            other => Err(format!("unknown style `{other}`")),
        }
    }
}

/// Unknown names fall back to the default style rather than failing.
impl From<String> for Style {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_default()
    }
}

/// What to generate. Fixed for the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub repository_url: String,
    pub user_prompt: Option<String>,
    pub style: Style,
}

impl GenerationRequest {
    pub fn new(repository_url: impl Into<String>) -> Self {
        Self {
            repository_url: repository_url.into().trim().to_string(),
            user_prompt: None,
            style: Style::default(),
        }
    }

    pub fn with_style(mut self, style: Style) -> Self {
        self.style = style;
        self
    }

    /// Blank prompts are dropped.
    pub fn with_user_prompt(mut self, prompt: Option<String>) -> Self {
        self.user_prompt = prompt.filter(|p| !p.trim().is_empty());
        self
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if is_repository_url(&self.repository_url) {
            Ok(())
        } else {
            Err(PipelineError::InvalidInput(self.repository_url.clone()))
        }
    }
}

/// Everything gathered during one run. Fields are only ever filled in.
#[derive(Debug, Clone, Default)]
pub struct PipelineContext {
    pub metadata: Option<RepoMetadata>,
    pub analysis: Option<RepoAnalysis>,
    pub insights: Option<CommunityInsights>,
    pub important_files: Vec<String>,
    pub files: Vec<FileContent>,
    pub signatures: Vec<FileSignatures>,
    pub verified_commands: VerifiedCommands,
    pub chunks: Vec<FileContent>,
    pub readme: Option<String>,
    pub quality: Option<QualityReport>,
    pub prior_readme: Option<String>,
    pub degraded: bool,
}

impl PipelineContext {
    /// The final result, once README, metadata and score are all present.
    pub fn into_result(self) -> Option<GenerationResult> {
        Some(GenerationResult {
            readme: self.readme?,
            metadata: self.metadata?,
            quality: self.quality?,
            original_readme: self.prior_readme,
            verified_commands: self.verified_commands,
            degraded: self.degraded,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub readme: String,
    pub metadata: RepoMetadata,
    pub quality: QualityReport,
    /// README found in the repository before this run, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_readme: Option<String>,
    #[serde(default)]
    pub verified_commands: VerifiedCommands,
    /// Set when the README was synthesized locally after a failure.
    #[serde(default)]
    pub degraded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImproveResult {
    pub readme: String,
    pub quality: QualityReport,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_style_falls_back_to_standard() {
        let style: Style = serde_json::from_str("\"flamboyant\"").unwrap();
        assert_eq!(style, Style::Standard);
        let style: Style = serde_json::from_str("\"Detailed\"").unwrap();
        assert_eq!(style, Style::Detailed);
        assert_eq!(serde_json::to_string(&Style::Minimal).unwrap(), "\"minimal\"");
    }

    #[test]
    fn style_selects_token_budget() {
        assert_eq!(Style::Minimal.token_limit(), 3000);
        assert_eq!(Style::default().token_limit(), 6000);
        assert_eq!(Style::Detailed.token_limit(), 8000);
    }

    #[test]
    fn request_validation_requires_a_github_repository() {
        assert!(GenerationRequest::new(" https://github.com/acme/widget ").validate().is_ok());
        assert!(matches!(
            GenerationRequest::new("https://example.com/acme").validate(),
            Err(PipelineError::InvalidInput(_))
        ));
    }

    #[test]
    fn blank_prompt_is_dropped() {
        let request = GenerationRequest::new("https://github.com/acme/widget")
            .with_user_prompt(Some("   ".to_string()));
        assert_eq!(request.user_prompt, None);
    }

    #[test]
    fn incomplete_context_yields_no_result() {
        let ctx = PipelineContext {
            metadata: Some(RepoMetadata::default()),
            readme: Some("# x".to_string()),
            ..Default::default()
        };
        assert!(ctx.into_result().is_none());
    }
}
