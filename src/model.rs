//! Data exchanged with the remote agents.
//!
//! Field names follow the camelCase JSON the agents emit. Every collection is
//! `#[serde(default)]` because the agents omit empty fields freely.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Repository facts returned by `get_repo_metadata`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoMetadata {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "starCount", alias = "stargazersCount")]
    pub stars: u64,
    #[serde(default, alias = "primaryLanguage")]
    pub language: Option<String>,
    /// License name; the agent reports `"None"` when the repository has none.
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default, alias = "defaultBranchName")]
    pub default_branch: Option<String>,
    #[serde(default, alias = "lastUpdated", alias = "pushedAt")]
    pub updated_at: Option<String>,
}

impl RepoMetadata {
    /// The license name, if the repository actually declares one.
    pub fn license_name(&self) -> Option<&str> {
        self.license
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.eq_ignore_ascii_case("none"))
    }
}

/// One entry of the flattened repository tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    #[serde(rename = "type", default = "default_entry_kind")]
    pub kind: String,
    #[serde(default)]
    pub size: Option<u64>,
}

fn default_entry_kind() -> String {
    "file".to_string()
}

/// Structural analysis returned by `analyze_repository`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoAnalysis {
    #[serde(default, alias = "files")]
    pub tree: Vec<FileEntry>,
    /// Language name to number of files.
    #[serde(default)]
    pub languages: BTreeMap<String, u64>,
    #[serde(default)]
    pub key_files: Vec<String>,
    #[serde(default)]
    pub entry_points: Vec<String>,
    #[serde(default)]
    pub config_files: Vec<String>,
    #[serde(default, alias = "testDirectories")]
    pub test_dirs: Vec<String>,
    #[serde(default, alias = "fileCount")]
    pub total_files: u64,
    #[serde(default)]
    pub total_size: u64,
}

impl RepoAnalysis {
    /// File count, preferring the agent's total over the tree length.
    pub fn file_count(&self) -> u64 {
        if self.total_files > 0 {
            self.total_files
        } else {
            self.tree.iter().filter(|e| e.kind == "file").count() as u64
        }
    }

    /// Languages ordered by descending file count, then name.
    pub fn languages_by_usage(&self) -> Vec<(&str, u64)> {
        let mut langs: Vec<_> = self
            .languages
            .iter()
            .map(|(name, count)| (name.as_str(), *count))
            .collect();
        langs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        langs
    }
}

/// Community and activity data returned by `get_community_insights`.
///
/// Items are forwarded to the generator untouched, so they stay opaque.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunityInsights {
    #[serde(default)]
    pub recent_issues: Vec<Value>,
    #[serde(default, alias = "recentPullRequests")]
    pub recent_prs: Vec<Value>,
    #[serde(default)]
    pub top_contributors: Vec<Value>,
    #[serde(default)]
    pub latest_releases: Vec<Value>,
    #[serde(default)]
    pub community_health: Option<Value>,
}

/// A file path with its (possibly truncated) contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContent {
    pub path: String,
    pub content: String,
}

/// Signatures matched in one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSignatures {
    pub path: String,
    #[serde(default)]
    pub signatures: Vec<String>,
}

/// Shell commands lifted from manifests and build files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedCommands {
    #[serde(default)]
    pub install: Vec<String>,
    #[serde(default)]
    pub run: Vec<String>,
    #[serde(default)]
    pub test: Vec<String>,
    #[serde(default)]
    pub build: Vec<String>,
    #[serde(default)]
    pub lint: Vec<String>,
    #[serde(default)]
    pub other: Vec<String>,
}

impl VerifiedCommands {
    pub fn is_empty(&self) -> bool {
        self.sections().iter().all(|(_, cmds)| cmds.is_empty())
    }

    pub fn len(&self) -> usize {
        self.sections().iter().map(|(_, cmds)| cmds.len()).sum()
    }

    /// Categories in display order.
    pub fn sections(&self) -> [(&'static str, &[String]); 6] {
        [
            ("Install", &self.install),
            ("Build", &self.build),
            ("Run", &self.run),
            ("Test", &self.test),
            ("Lint", &self.lint),
            ("Other", &self.other),
        ]
    }
}

/// The five fixed scoring categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityCategory {
    Completeness,
    Accuracy,
    Structure,
    Readability,
    Visual,
}

impl QualityCategory {
    pub const ALL: [Self; 5] = [
        Self::Completeness,
        Self::Accuracy,
        Self::Structure,
        Self::Readability,
        Self::Visual,
    ];

    pub const fn key(self) -> &'static str {
        match self {
            Self::Completeness => "completeness",
            Self::Accuracy => "accuracy",
            Self::Structure => "structure",
            Self::Readability => "readability",
            Self::Visual => "visual",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Completeness => "Completeness",
            Self::Accuracy => "Accuracy",
            Self::Structure => "Structure & Formatting",
            Self::Readability => "Readability",
            Self::Visual => "Visual Appeal",
        }
    }

    /// Percentage weight; the five weights sum to 100.
    pub const fn weight(self) -> u32 {
        match self {
            Self::Completeness => 30,
            Self::Accuracy => 25,
            Self::Structure => 20,
            Self::Readability => 15,
            Self::Visual => 10,
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.key().eq_ignore_ascii_case(key))
    }
}

/// Score of one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    #[serde(deserialize_with = "deserialize_score")]
    pub score: u32,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub weight: u32,
    #[serde(default)]
    pub detail: String,
}

/// Result of `validate_readme`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    #[serde(deserialize_with = "deserialize_score")]
    pub score: u32,
    #[serde(default)]
    pub categories: BTreeMap<String, CategoryScore>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl QualityReport {
    /// Weighted average of the five fixed categories, rounded.
    ///
    /// `None` unless every category is present.
    pub fn weighted_score(&self) -> Option<u32> {
        let mut total = 0;
        for category in QualityCategory::ALL {
            let entry = self.categories.get(category.key())?;
            total += entry.score.min(100) * category.weight();
        }
        Some((total + 50) / 100)
    }

    /// Pins category weights and labels to the fixed table and recomputes the
    /// overall score when the full breakdown is available.
    pub fn normalized(mut self) -> Self {
        let categories = std::mem::take(&mut self.categories);
        for (key, mut entry) in categories {
            entry.score = entry.score.min(100);
            let key = match QualityCategory::from_key(&key) {
                Some(category) => {
                    entry.weight = category.weight();
                    if entry.label.is_empty() {
                        entry.label = category.label().to_string();
                    }
                    category.key().to_string()
                }
                None => key,
            };
            self.categories.insert(key, entry);
        }
        self.score = self.weighted_score().unwrap_or(self.score).min(100);
        self
    }

    /// Synthetic report attached to a degraded result.
    pub fn fallback(score: u32) -> Self {
        Self {
            score,
            categories: BTreeMap::new(),
            suggestions: vec![
                "The AI agents could not complete the full analysis. Try generating again for a complete README."
                    .to_string(),
            ],
        }
    }
}

/// Accepts integer or fractional scores and clamps them into `0..=100`.
fn deserialize_score<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    if raw.is_nan() {
        return Ok(0);
    }
    Ok(raw.round().clamp(0.0, 100.0) as u32)
}
