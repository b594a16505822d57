use pulldown_cmark::{CodeBlockKind, Event, Parser, Tag, TagEnd};
use regex::Regex;
use std::sync::LazyLock;

use crate::model::FileContent;

/// Base names accepted as an existing README.
const README_NAMES: [&str; 2] = ["readme", "readme.md"];

/// Prefixes the code reader uses in place of content it could not fetch.
const ERROR_PLACEHOLDERS: [&str; 2] = ["Error reading file:", "Error:"];

static H1_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#\s+(.+)$").expect("static regex"));

/// Extract the title from a markdown document (first H1 heading)
pub fn extract_title(content: &str) -> Option<String> {
    H1_HEADING
        .captures(content)
        .map(|cap| cap[1].trim().to_string())
}

/// Removes a single markdown fence wrapped around an entire document.
///
/// Generators are asked for raw markdown but occasionally answer with
/// "```markdown ... ```". Documents that merely start with a code block are
/// returned unchanged.
pub fn strip_wrapping_fence(text: &str) -> String {
    let trimmed = text.trim();
    let mut events = Parser::new(trimmed).into_offset_iter();

    let Some((Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(lang))), range)) = events.next()
    else {
        return trimmed.to_string();
    };
    if range.end < trimmed.len() || !matches!(lang.as_ref(), "" | "markdown" | "md") {
        return trimmed.to_string();
    }

    let mut inner = String::new();
    for (event, _) in events {
        match event {
            Event::Text(text) => inner.push_str(&text),
            Event::End(TagEnd::CodeBlock) => break,
            _ => {}
        }
    }
    inner.trim().to_string()
}

/// Whether a repository path names a top-level style README.
pub fn is_readme_path(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path).to_lowercase();
    README_NAMES.contains(&name.as_str())
}

/// Whether fetched content is the reader's stand-in for a failed fetch.
pub fn is_error_placeholder(content: &str) -> bool {
    let content = content.trim_start();
    content.is_empty() || ERROR_PLACEHOLDERS.iter().any(|p| content.starts_with(p))
}

/// The first README among the fetched files whose content was really read.
pub fn find_prior_readme(files: &[FileContent]) -> Option<&FileContent> {
    files
        .iter()
        .find(|f| is_readme_path(&f.path) && !is_error_placeholder(&f.content))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str, content: &str) -> FileContent {
        FileContent {
            path: path.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn title_is_first_h1() {
        let doc = "Intro\n## Not this\n# widget 🚀\n# Later";
        assert_eq!(extract_title(doc).as_deref(), Some("widget 🚀"));
        assert_eq!(extract_title("no headings"), None);
    }

    #[test]
    fn unwraps_markdown_fence() {
        let wrapped = "```markdown\n# widget\n\nA tiny widget.\n```\n";
        assert_eq!(strip_wrapping_fence(wrapped), "# widget\n\nA tiny widget.");
    }

    #[test]
    fn keeps_documents_that_only_start_with_code() {
        let doc = "```bash\nnpm install\n```\n\n# widget";
        assert_eq!(strip_wrapping_fence(doc), doc);
        let plain = "# widget\n\n```rust\nfn main() {}\n```";
        assert_eq!(strip_wrapping_fence(plain), plain);
    }

    #[test]
    fn readme_detection_is_case_insensitive() {
        assert!(is_readme_path("README.md"));
        assert!(is_readme_path("docs/Readme.MD"));
        assert!(is_readme_path("README"));
        assert!(!is_readme_path("README.rst"));
        assert!(!is_readme_path("src/readme_parser.rs"));
    }

    #[test]
    fn prior_readme_skips_error_placeholders() {
        let files = vec![
            file("README.md", "Error reading file: Not Found"),
            file("src/main.rs", "fn main() {}"),
        ];
        assert!(find_prior_readme(&files).is_none());

        let files = vec![file("readme.md", "# old docs")];
        assert_eq!(find_prior_readme(&files).unwrap().content, "# old docs");
    }
}
