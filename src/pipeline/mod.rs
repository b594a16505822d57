//! The README pipeline: analysis, insights, reading, generation and quality,
//! run strictly in that order against the remote agents.
//!
//! A failure after metadata has been fetched degrades to a locally
//! synthesized README instead of failing the run; cancellation never does.

pub mod context;
pub mod fallback;
pub mod progress;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::client::ToolCaller;
use crate::error::{PipelineError, ToolError};
use crate::readme::find_prior_readme;
use crate::tools::requests::{
    AnalyzeRequest, ChunkRequest, CommandsRequest, EnhanceRequest, GenerateRequest,
    ImportantFilesRequest, InsightsRequest, MetadataRequest, ReadFilesRequest, SignaturesRequest,
    ValidateRequest,
};
use crate::tools::ToolRequest;

pub use context::{GenerationRequest, GenerationResult, ImproveResult, PipelineContext, Style};
pub use fallback::FALLBACK_SCORE;
pub use progress::{ProgressBoard, ProgressEvent, ProgressSink, Stage, Status};

/// Drafts scoring below this get one enhancement pass.
pub const QUALITY_THRESHOLD: u32 = 80;

/// Token budget for the code excerpts handed to the generator.
pub const CHUNK_TOKEN_BUDGET: u32 = 15_000;

/// Instructions used by `improve` when the caller gives none.
pub const DEFAULT_IMPROVE_SUGGESTIONS: &str =
    "Improve overall quality, add missing sections, enhance formatting";

/// Combine scorer suggestions with a caller's own instructions.
pub fn improve_instructions(suggestions: Option<&str>, custom_prompt: Option<&str>) -> String {
    let mut combined = suggestions
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_IMPROVE_SUGGESTIONS)
        .to_string();
    if let Some(prompt) = custom_prompt.map(str::trim).filter(|p| !p.is_empty()) {
        combined.push_str("\n\nUser's additional instructions: ");
        combined.push_str(prompt);
    }
    combined
}

pub struct Orchestrator {
    tools: Arc<dyn ToolCaller>,
}

impl Orchestrator {
    pub fn new(tools: Arc<dyn ToolCaller>) -> Self {
        Self { tools }
    }

    /// Run the whole pipeline for one repository.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult, PipelineError> {
        request.validate()?;
        tracing::info!(
            repo = %request.repository_url,
            style = %request.style,
            "starting README generation"
        );

        let mut ctx = PipelineContext::default();
        let err = match self.run(request, &mut ctx, progress, cancel).await {
            Ok(result) => {
                tracing::info!(
                    repo = %result.metadata.name,
                    score = result.quality.score,
                    "README generation finished"
                );
                return Ok(result);
            }
            Err(e) => e,
        };

        if err.is_cancelled() {
            tracing::info!(repo = %request.repository_url, "README generation cancelled");
            progress.error("Generation cancelled");
            return Err(PipelineError::Cancelled);
        }

        if ctx.metadata.is_none() {
            tracing::error!(error = %err, "README generation failed before metadata was available");
            progress.error(err.to_string());
            return Err(err);
        }

        tracing::warn!(error = %err, "pipeline failed, synthesizing fallback README");
        let stage = progress
            .current_stage()
            .unwrap_or(Stage::Generation)
            .max(Stage::Generation);
        progress.running(stage, "Agents unavailable, generating fallback README...");

        match fallback::fallback_result(ctx) {
            Some(result) => {
                progress.complete(Stage::Quality, format!("Quality Score: {FALLBACK_SCORE}"));
                Ok(result)
            }
            None => {
                progress.error(err.to_string());
                Err(err)
            }
        }
    }

    /// Enhance an existing README with free-form instructions, then re-score it.
    pub async fn improve(
        &self,
        readme: &str,
        suggestions: &str,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<ImproveResult, PipelineError> {
        let outcome = self.enhance_and_score(readme, suggestions, progress, cancel).await;

        if let Err(e) = &outcome {
            tracing::error!(error = %e, "README improvement failed");
            progress.error(e.to_string());
        }
        outcome
    }

    async fn enhance_and_score(
        &self,
        readme: &str,
        suggestions: &str,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<ImproveResult, PipelineError> {
        checkpoint(cancel)?;
        progress.running(Stage::Quality, "Enhancing content...");
        let enhanced = self
            .invoke(Stage::Quality, &EnhanceRequest { readme, suggestions }, cancel)
            .await?;

        checkpoint(cancel)?;
        progress.running(Stage::Quality, "Re-validating content...");
        let quality = self
            .invoke(Stage::Quality, &ValidateRequest { readme: &enhanced }, cancel)
            .await?;

        progress.complete(Stage::Quality, format!("Quality Score: {}", quality.score));
        Ok(ImproveResult {
            readme: enhanced,
            quality,
        })
    }

    async fn run(
        &self,
        request: &GenerationRequest,
        ctx: &mut PipelineContext,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult, PipelineError> {
        let repo_url = request.repository_url.as_str();

        // Analysis
        checkpoint(cancel)?;
        progress.running(Stage::Analysis, "Connecting to repository...");
        let metadata = self
            .invoke(Stage::Analysis, &MetadataRequest { repo_url }, cancel)
            .await?;
        tracing::info!(
            repo = %metadata.name,
            stars = metadata.stars,
            "fetched repository metadata"
        );
        ctx.metadata = Some(metadata.clone());

        checkpoint(cancel)?;
        progress.running(Stage::Analysis, "Analyzing structure...");
        let analysis = self
            .invoke(Stage::Analysis, &AnalyzeRequest { repo_url }, cancel)
            .await?;
        let file_count = analysis.file_count();
        let language_count = analysis.languages.len();
        ctx.analysis = Some(analysis.clone());

        checkpoint(cancel)?;
        progress.running(
            Stage::Analysis,
            format!("Identifying key files among {file_count} files..."),
        );
        ctx.important_files = self
            .invoke(
                Stage::Analysis,
                &ImportantFilesRequest {
                    file_tree: &analysis.tree,
                },
                cancel,
            )
            .await?;
        progress.complete(
            Stage::Analysis,
            format!("Repository analyzed: {file_count} files, {language_count} languages"),
        );

        // Insights, best-effort
        checkpoint(cancel)?;
        progress.running(Stage::Insights, "Gathering community insights...");
        match self
            .invoke(Stage::Insights, &InsightsRequest { repo_url }, cancel)
            .await
        {
            Ok(insights) => {
                ctx.insights = Some(insights);
                progress.complete(Stage::Insights, "Community insights gathered");
            }
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "community insights unavailable, continuing without them"
                );
                progress.complete(Stage::Insights, "Community insights unavailable, skipped");
            }
        }

        // Reading
        checkpoint(cancel)?;
        progress.running(
            Stage::Reading,
            format!("Reading {} files...", ctx.important_files.len()),
        );
        let files = self
            .invoke(
                Stage::Reading,
                &ReadFilesRequest {
                    repo_url,
                    file_paths: &ctx.important_files,
                },
                cancel,
            )
            .await?;
        if let Some(prior) = find_prior_readme(&files) {
            tracing::debug!(path = %prior.path, "found existing README");
            ctx.prior_readme = Some(prior.content.clone());
        }
        ctx.files = files;

        checkpoint(cancel)?;
        progress.running(Stage::Reading, "Extracting code signatures...");
        ctx.signatures = self
            .invoke(Stage::Reading, &SignaturesRequest { files: &ctx.files }, cancel)
            .await?;

        checkpoint(cancel)?;
        progress.running(Stage::Reading, "Extracting verified commands...");
        match self
            .invoke(Stage::Reading, &CommandsRequest { files: &ctx.files }, cancel)
            .await
        {
            Ok(commands) => ctx.verified_commands = commands,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "command extraction failed, continuing without commands"
                );
            }
        }

        checkpoint(cancel)?;
        progress.running(Stage::Reading, "Optimizing context...");
        ctx.chunks = self
            .invoke(
                Stage::Reading,
                &ChunkRequest {
                    files: &ctx.files,
                    max_tokens: CHUNK_TOKEN_BUDGET,
                },
                cancel,
            )
            .await?;
        progress.complete(
            Stage::Reading,
            format!(
                "Code processed: {} files, {} commands",
                ctx.files.len(),
                ctx.verified_commands.len()
            ),
        );

        // Generation
        checkpoint(cancel)?;
        progress.running(Stage::Generation, "Drafting documentation...");
        let draft = self
            .invoke(
                Stage::Generation,
                &GenerateRequest {
                    metadata: &metadata,
                    analysis: &analysis,
                    code_summaries: &ctx.chunks,
                    signatures: &ctx.signatures,
                    insights: ctx.insights.as_ref(),
                    verified_commands: &ctx.verified_commands,
                    style: request.style,
                    user_prompt: request.user_prompt.as_deref(),
                    max_tokens: request.style.token_limit(),
                },
                cancel,
            )
            .await?;
        ctx.readme = Some(draft.clone());
        progress.complete(Stage::Generation, "Draft generated");

        // Quality
        checkpoint(cancel)?;
        progress.running(Stage::Quality, "Validating content...");
        let quality = self
            .invoke(Stage::Quality, &ValidateRequest { readme: &draft }, cancel)
            .await?;
        ctx.quality = Some(quality.clone());

        let readme = if quality.score < QUALITY_THRESHOLD {
            checkpoint(cancel)?;
            progress.running(
                Stage::Quality,
                format!(
                    "Score {} is below {QUALITY_THRESHOLD}, enhancing content...",
                    quality.score
                ),
            );
            let suggestions = quality.suggestions.join(", ");
            let enhanced = self
                .invoke(
                    Stage::Quality,
                    &EnhanceRequest {
                        readme: &draft,
                        suggestions: &suggestions,
                    },
                    cancel,
                )
                .await?;
            if enhanced.trim().is_empty() {
                tracing::warn!("enhancement returned nothing, keeping the draft");
                draft
            } else {
                enhanced
            }
        } else {
            draft
        };
        ctx.readme = Some(readme.clone());
        progress.complete(Stage::Quality, format!("Quality Score: {}", quality.score));

        Ok(GenerationResult {
            readme,
            metadata,
            quality,
            original_readme: ctx.prior_readme.clone(),
            verified_commands: ctx.verified_commands.clone(),
            degraded: false,
        })
    }

    /// Call one tool and decode its output, attributing failures to `stage`.
    async fn invoke<R: ToolRequest>(
        &self,
        stage: Stage,
        request: &R,
        cancel: &CancellationToken,
    ) -> Result<R::Output, PipelineError> {
        let text = self
            .tools
            .call_tool(R::TOOL, request.arguments(), cancel)
            .await
            .map_err(|source| match source {
                ToolError::Cancelled => PipelineError::Cancelled,
                source => PipelineError::Tool { stage, source },
            })?;
        R::decode(&text).map_err(|source| PipelineError::Decode {
            stage,
            tool: R::TOOL,
            source,
        })
    }
}

fn checkpoint(cancel: &CancellationToken) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        Err(PipelineError::Cancelled)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn improve_instructions_default_and_custom_prompt() {
        assert_eq!(improve_instructions(None, None), DEFAULT_IMPROVE_SUGGESTIONS);
        assert_eq!(improve_instructions(Some("  "), None), DEFAULT_IMPROVE_SUGGESTIONS);
        assert_eq!(
            improve_instructions(Some("Add badges"), Some("Keep it short")),
            "Add badges\n\nUser's additional instructions: Keep it short"
        );
    }

    #[test]
    fn checkpoint_observes_cancellation() {
        let cancel = CancellationToken::new();
        assert!(checkpoint(&cancel).is_ok());
        cancel.cancel();
        assert!(matches!(checkpoint(&cancel), Err(PipelineError::Cancelled)));
    }
}
