//! Local README synthesis used when the remote pipeline fails after metadata
//! has been collected. Never touches the network.

use std::fmt::Write;

use crate::model::{QualityReport, RepoAnalysis, RepoMetadata, VerifiedCommands};
use crate::pipeline::context::{GenerationResult, PipelineContext};

/// Quality score attached to a synthesized README.
pub const FALLBACK_SCORE: u32 = 30;

/// Turn a partially filled context into a degraded result.
///
/// Returns `None` when no metadata was collected, in which case there is
/// nothing honest to write.
pub fn fallback_result(mut ctx: PipelineContext) -> Option<GenerationResult> {
    let metadata = ctx.metadata.as_ref()?;
    let readme = synthesize_readme(metadata, ctx.analysis.as_ref(), &ctx.verified_commands);

    ctx.readme = Some(readme);
    ctx.quality = Some(QualityReport::fallback(FALLBACK_SCORE));
    ctx.degraded = true;
    ctx.into_result()
}

pub fn synthesize_readme(
    metadata: &RepoMetadata,
    analysis: Option<&RepoAnalysis>,
    commands: &VerifiedCommands,
) -> String {
    let mut out = String::new();
    let name = metadata.name.trim();
    let name = if name.is_empty() { "Project" } else { name };

    let _ = writeln!(out, "# {name}\n");

    let badges = badges(metadata);
    if !badges.is_empty() {
        let _ = writeln!(out, "{}\n", badges.join(" "));
    }

    match metadata.description.as_deref().map(str::trim) {
        Some(description) if !description.is_empty() => {
            let _ = writeln!(out, "> {description}\n");
        }
        _ => {
            let _ = writeln!(out, "> No description provided.\n");
        }
    }

    out.push_str("## 📊 Repository Stats\n\n");
    let _ = writeln!(out, "- ⭐ Stars: {}", metadata.stars);
    if let Some(analysis) = analysis {
        let _ = writeln!(out, "- 📁 Files: {}", analysis.file_count());
    }
    if let Some(language) = metadata.language.as_deref() {
        let _ = writeln!(out, "- 💻 Primary language: {language}");
    }
    if let Some(updated) = metadata.updated_at.as_deref() {
        let _ = writeln!(out, "- 🕒 Last updated: {updated}");
    }
    out.push('\n');

    if let Some(analysis) = analysis {
        let languages = analysis.languages_by_usage();
        if !languages.is_empty() {
            out.push_str("## 🧰 Languages\n\n");
            for (language, files) in languages {
                let unit = if files == 1 { "file" } else { "files" };
                let _ = writeln!(out, "- {language} ({files} {unit})");
            }
            out.push('\n');
        }
    }

    if !metadata.topics.is_empty() {
        out.push_str("## 🏷️ Topics\n\n");
        let topics: Vec<_> = metadata.topics.iter().map(|t| format!("`{t}`")).collect();
        let _ = writeln!(out, "{}\n", topics.join(" "));
    }

    if !commands.is_empty() {
        out.push_str("## 🚀 Getting Started\n\n");
        for (label, cmds) in commands.sections() {
            if cmds.is_empty() {
                continue;
            }
            let _ = writeln!(out, "### {label}\n\n```bash");
            for cmd in cmds {
                let _ = writeln!(out, "{cmd}");
            }
            out.push_str("```\n\n");
        }
    }

    if let Some(license) = metadata.license_name() {
        let _ = writeln!(out, "## 📄 License\n\n{license}\n");
    }

    out.push_str(
        "---\n\n*This README was assembled from repository metadata because the full analysis could not complete.*\n",
    );
    out
}

fn badges(metadata: &RepoMetadata) -> Vec<String> {
    let mut badges = Vec::new();
    if let Some(language) = metadata.language.as_deref().filter(|l| !l.trim().is_empty()) {
        badges.push(format!(
            "![Language](https://img.shields.io/badge/language-{}-blue)",
            shield_escape(language)
        ));
    }
    if let Some(license) = metadata.license_name() {
        badges.push(format!(
            "![License](https://img.shields.io/badge/license-{}-green)",
            shield_escape(license)
        ));
    }
    if metadata.stars > 0 {
        badges.push(format!(
            "![Stars](https://img.shields.io/badge/stars-{}-yellow)",
            metadata.stars
        ));
    }
    badges
}

/// Escape a label for a static shields.io badge path segment.
fn shield_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '-' => out.push_str("--"),
            '_' => out.push_str("__"),
            ' ' => out.push_str("%20"),
            c if c.is_ascii_alphanumeric() || c == '.' || c == '~' => out.push(c),
            c => {
                let mut buf = [0u8; 4];
                for byte in c.encode_utf8(&mut buf).bytes() {
                    let _ = write!(out, "%{byte:02X}");
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn widget() -> RepoMetadata {
        RepoMetadata {
            name: "widget".to_string(),
            description: Some("A tiny widget.".to_string()),
            stars: 12,
            language: Some("Go".to_string()),
            license: Some("None".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn title_is_the_repository_name() {
        let readme = synthesize_readme(&widget(), None, &VerifiedCommands::default());
        assert!(readme.starts_with("# widget\n"));
        assert!(readme.contains("> A tiny widget."));
        assert!(readme.contains("language-Go-blue"));
        assert!(readme.contains("stars-12-yellow"));
        assert!(!readme.contains("## 📄 License"));
    }

    #[test]
    fn badge_labels_are_escaped() {
        assert_eq!(shield_escape("C++"), "C%2B%2B");
        assert_eq!(shield_escape("Apache-2.0"), "Apache--2.0");
        assert_eq!(shield_escape("Jupyter Notebook"), "Jupyter%20Notebook");
        assert_eq!(shield_escape("snake_case"), "snake__case");
    }

    #[test]
    fn languages_and_commands_are_listed() {
        let analysis = RepoAnalysis {
            languages: BTreeMap::from([("Go".to_string(), 9), ("Shell".to_string(), 1)]),
            total_files: 10,
            ..Default::default()
        };
        let commands = VerifiedCommands {
            install: vec!["go mod download".to_string()],
            test: vec!["go test ./...".to_string()],
            ..Default::default()
        };
        let readme = synthesize_readme(&widget(), Some(&analysis), &commands);

        assert!(readme.contains("- 📁 Files: 10"));
        assert!(readme.contains("- Go (9 files)\n- Shell (1 file)"));
        assert!(readme.contains("### Install\n\n```bash\ngo mod download\n```"));
        assert!(readme.contains("### Test"));
        assert!(!readme.contains("### Lint"));
    }

    #[test]
    fn degraded_result_needs_metadata() {
        assert!(fallback_result(PipelineContext::default()).is_none());

        let ctx = PipelineContext {
            metadata: Some(widget()),
            prior_readme: Some("# old".to_string()),
            ..Default::default()
        };
        let result = fallback_result(ctx).unwrap();
        assert!(result.degraded);
        assert_eq!(result.quality.score, FALLBACK_SCORE);
        assert_eq!(result.quality.suggestions.len(), 1);
        assert_eq!(result.original_readme.as_deref(), Some("# old"));
    }
}
