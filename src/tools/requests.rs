//! Typed arguments for every tool, each tied to its [`Tool`] and output type.
//!
//! Requests borrow from the pipeline context, so building one never copies
//! file contents.

use rmcp::model::JsonObject;
use serde::Serialize;
use serde_json::Value;

use crate::decode::decode_json;
use crate::error::DecodeError;
use crate::model::{
    CommunityInsights, FileContent, FileEntry, FileSignatures, QualityReport, RepoAnalysis,
    RepoMetadata, VerifiedCommands,
};
use crate::pipeline::context::Style;
use crate::readme::strip_wrapping_fence;
use crate::tools::Tool;

/// Upper bound on the files the ranking tool may hand to the reader.
pub const MAX_IMPORTANT_FILES: usize = 20;

pub trait ToolRequest: Serialize + Send + Sync {
    const TOOL: Tool;
    type Output: Send;

    /// Turn the tool's text payload into the typed output.
    fn decode(text: &str) -> Result<Self::Output, DecodeError>;

    fn arguments(&self) -> JsonObject {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                tracing::error!(
                    tool = %Self::TOOL,
                    value = %other,
                    "tool arguments are not an object"
                );
                JsonObject::new()
            }
            Err(e) => {
                tracing::error!(
                    tool = %Self::TOOL,
                    error = %e,
                    "failed to serialize tool arguments"
                );
                JsonObject::new()
            }
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataRequest<'a> {
    pub repo_url: &'a str,
}

impl ToolRequest for MetadataRequest<'_> {
    const TOOL: Tool = Tool::RepoMetadata;
    type Output = RepoMetadata;

    fn decode(text: &str) -> Result<RepoMetadata, DecodeError> {
        decode_json(text)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest<'a> {
    pub repo_url: &'a str,
}

impl ToolRequest for AnalyzeRequest<'_> {
    const TOOL: Tool = Tool::AnalyzeRepository;
    type Output = RepoAnalysis;

    fn decode(text: &str) -> Result<RepoAnalysis, DecodeError> {
        decode_json(text)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportantFilesRequest<'a> {
    pub file_tree: &'a [FileEntry],
}

impl ToolRequest for ImportantFilesRequest<'_> {
    const TOOL: Tool = Tool::IdentifyImportantFiles;
    type Output = Vec<String>;

    fn decode(text: &str) -> Result<Vec<String>, DecodeError> {
        let mut paths: Vec<String> = decode_json(text)?;
        paths.truncate(MAX_IMPORTANT_FILES);
        Ok(paths)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightsRequest<'a> {
    pub repo_url: &'a str,
}

impl ToolRequest for InsightsRequest<'_> {
    const TOOL: Tool = Tool::CommunityInsights;
    type Output = CommunityInsights;

    fn decode(text: &str) -> Result<CommunityInsights, DecodeError> {
        decode_json(text)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadFilesRequest<'a> {
    pub repo_url: &'a str,
    pub file_paths: &'a [String],
}

impl ToolRequest for ReadFilesRequest<'_> {
    const TOOL: Tool = Tool::ReadFiles;
    type Output = Vec<FileContent>;

    fn decode(text: &str) -> Result<Vec<FileContent>, DecodeError> {
        decode_json(text)
    }
}

#[derive(Debug, Serialize)]
pub struct SignaturesRequest<'a> {
    pub files: &'a [FileContent],
}

impl ToolRequest for SignaturesRequest<'_> {
    const TOOL: Tool = Tool::ExtractSignatures;
    type Output = Vec<FileSignatures>;

    fn decode(text: &str) -> Result<Vec<FileSignatures>, DecodeError> {
        decode_json(text)
    }
}

#[derive(Debug, Serialize)]
pub struct CommandsRequest<'a> {
    pub files: &'a [FileContent],
}

impl ToolRequest for CommandsRequest<'_> {
    const TOOL: Tool = Tool::ExtractCommands;
    type Output = VerifiedCommands;

    fn decode(text: &str) -> Result<VerifiedCommands, DecodeError> {
        decode_json(text)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRequest<'a> {
    pub files: &'a [FileContent],
    pub max_tokens: u32,
}

impl ToolRequest for ChunkRequest<'_> {
    const TOOL: Tool = Tool::SmartChunk;
    type Output = Vec<FileContent>;

    fn decode(text: &str) -> Result<Vec<FileContent>, DecodeError> {
        decode_json(text)
    }
}

/// Everything the generator gets to see about the repository.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest<'a> {
    pub metadata: &'a RepoMetadata,
    pub analysis: &'a RepoAnalysis,
    pub code_summaries: &'a [FileContent],
    pub signatures: &'a [FileSignatures],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insights: Option<&'a CommunityInsights>,
    pub verified_commands: &'a VerifiedCommands,
    pub style: Style,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_prompt: Option<&'a str>,
    pub max_tokens: u32,
}

impl ToolRequest for GenerateRequest<'_> {
    const TOOL: Tool = Tool::GenerateReadme;
    type Output = String;

    fn decode(text: &str) -> Result<String, DecodeError> {
        Ok(strip_wrapping_fence(text))
    }
}

#[derive(Debug, Serialize)]
pub struct ValidateRequest<'a> {
    pub readme: &'a str,
}

impl ToolRequest for ValidateRequest<'_> {
    const TOOL: Tool = Tool::ValidateReadme;
    type Output = QualityReport;

    fn decode(text: &str) -> Result<QualityReport, DecodeError> {
        decode_json::<QualityReport>(text).map(QualityReport::normalized)
    }
}

#[derive(Debug, Serialize)]
pub struct EnhanceRequest<'a> {
    pub readme: &'a str,
    /// Free-form instructions; scorer suggestions joined with `", "`.
    pub suggestions: &'a str,
}

impl ToolRequest for EnhanceRequest<'_> {
    const TOOL: Tool = Tool::EnhanceReadme;
    type Output = String;

    fn decode(text: &str) -> Result<String, DecodeError> {
        Ok(strip_wrapping_fence(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn arguments_use_wire_field_names() {
        let paths = vec!["src/main.rs".to_string()];
        let args = ReadFilesRequest {
            repo_url: "https://github.com/acme/widget",
            file_paths: &paths,
        }
        .arguments();
        assert_eq!(
            Value::Object(args),
            json!({
                "repoUrl": "https://github.com/acme/widget",
                "filePaths": ["src/main.rs"],
            })
        );

        let args = ChunkRequest {
            files: &[],
            max_tokens: 15_000,
        }
        .arguments();
        assert_eq!(args["maxTokens"], json!(15_000));
    }

    #[test]
    fn generate_omits_absent_optional_context() {
        let metadata = RepoMetadata {
            name: "widget".to_string(),
            ..Default::default()
        };
        let analysis = RepoAnalysis::default();
        let commands = VerifiedCommands::default();
        let args = GenerateRequest {
            metadata: &metadata,
            analysis: &analysis,
            code_summaries: &[],
            signatures: &[],
            insights: None,
            verified_commands: &commands,
            style: Style::Detailed,
            user_prompt: None,
            max_tokens: Style::Detailed.token_limit(),
        }
        .arguments();

        assert!(!args.contains_key("insights"));
        assert!(!args.contains_key("userPrompt"));
        assert_eq!(args["style"], json!("detailed"));
        assert_eq!(args["maxTokens"], json!(8000));
        assert_eq!(args["metadata"]["name"], json!("widget"));
        assert!(args.contains_key("codeSummaries"));
        assert!(args.contains_key("verifiedCommands"));
    }

    #[test]
    fn ranking_output_is_capped() {
        let many: Vec<String> = (0..30).map(|i| format!("src/f{i}.rs")).collect();
        let text = serde_json::to_string(&many).unwrap();
        let paths = ImportantFilesRequest::decode(&text).unwrap();
        assert_eq!(paths.len(), MAX_IMPORTANT_FILES);
        assert_eq!(paths[0], "src/f0.rs");
    }

    #[test]
    fn generated_markdown_is_unfenced() {
        let text = "```markdown\n# widget\n```";
        assert_eq!(GenerateRequest::decode(text).unwrap(), "# widget");
        assert_eq!(EnhanceRequest::decode(text).unwrap(), "# widget");
    }

    #[test]
    fn validation_report_is_normalized() {
        let text = r#"Here is the score:
```json
{"score": 10, "categories": {
  "completeness": {"score": 80},
  "accuracy": {"score": 90},
  "structure": {"score": 70},
  "readability": {"score": 60},
  "visual": {"score": 50}
}, "suggestions": ["Add badges"]}
```"#;
        let report = ValidateRequest::decode(text).unwrap();
        // 80*30 + 90*25 + 70*20 + 60*15 + 50*10 = 7450
        assert_eq!(report.score, 75);
        assert_eq!(report.categories["structure"].weight, 20);
        assert_eq!(report.suggestions, vec!["Add badges"]);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(
            MetadataRequest::decode("no json here"),
            Err(DecodeError::Malformed(_))
        ));
        assert!(matches!(
            MetadataRequest::decode("[1, 2]"),
            Err(DecodeError::Shape(_))
        ));
    }

    #[test]
    fn unserializable_arguments_become_an_empty_object() {
        // serde_json refuses maps whose keys are not strings.
        #[derive(Serialize)]
        struct Keyed {
            by_pair: std::collections::BTreeMap<(u8, u8), u8>,
        }

        impl ToolRequest for Keyed {
            const TOOL: Tool = Tool::ReadFiles;
            type Output = String;

            fn decode(text: &str) -> Result<String, DecodeError> {
                Ok(text.to_string())
            }
        }

        let request = Keyed {
            by_pair: [((1, 2), 3)].into_iter().collect(),
        };
        assert!(request.arguments().is_empty());
    }
}
