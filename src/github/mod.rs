use anyhow::{Context, Result};
use octocrab::Octocrab;
use octocrab::models::repos::Object;
use octocrab::params::repos::Reference;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::time::{Duration, sleep};

const README_PATH: &str = "README.md";
const COMMIT_MESSAGE: &str = "📝 Update README.md via README Resurrector";
const PR_TITLE: &str = "📝 Update README.md — Generated by README Resurrector";
const PR_BODY: &str = "## 🧟 README Resurrector\n\n\
This README was automatically generated by a multi-agent pipeline.\n\n\
**What's included:**\n\
- Auto-detected tech stack and project structure\n\
- Verified install/run/test commands from config files\n\
- Community insights and contributor acknowledgments\n\n\
---\n*Review the changes and merge when ready!*";

static REPO_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"github\.com[/:]([^/\s]+)/([^/\s?#]+)").expect("static regex")
});

/// Owner and name of a GitHub repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
}

impl RepoRef {
    /// Parse `github.com/<owner>/<repo>` out of a repository URL
    pub fn parse(url: &str) -> Option<Self> {
        let caps = REPO_URL.captures(url)?;
        let owner = caps[1].to_string();
        let repo = caps[2].trim_end_matches(".git").to_string();
        if owner.is_empty() || repo.is_empty() {
            return None;
        }
        Some(Self { owner, repo })
    }
}

/// Whether a URL points at a GitHub repository
pub fn is_repository_url(url: &str) -> bool {
    RepoRef::parse(url).is_some()
}

/// A pull request opened with a generated README
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestInfo {
    pub success: bool,
    pub pr_url: Option<String>,
    pub pr_number: u64,
    pub branch_name: String,
}

/// Publishes generated READMEs back to GitHub as pull requests
#[derive(Clone)]
pub struct ReadmePublisher {
    client: Octocrab,
}

impl ReadmePublisher {
    pub fn new(token: &str) -> Result<Self> {
        if token.trim().is_empty() {
            anyhow::bail!("GitHub token cannot be empty");
        }
        let client = Octocrab::builder().personal_token(token.to_string()).build()?;
        Ok(Self { client })
    }

    /// Branch off the default branch, commit the README there and open a pull request
    pub async fn open_pull_request(&self, repo: &RepoRef, readme: &str) -> Result<PullRequestInfo> {
        let handler = self.client.repos(&repo.owner, &repo.repo);

        let details = handler
            .get()
            .await
            .with_context(|| {
                format!("failed to fetch repo info for {}/{}", repo.owner, repo.repo)
            })?;
        let default_branch = details.default_branch.unwrap_or_else(|| "main".to_string());

        let head = handler
            .get_ref(&Reference::Branch(default_branch.clone()))
            .await
            .context("failed to get branch ref")?;
        let base_sha = match head.object {
            Object::Commit { sha, .. } | Object::Tag { sha, .. } => sha,
            _ => anyhow::bail!("default branch {default_branch} does not point at a commit"),
        };

        let branch_name = format!("readme-resurrector-{}", unix_millis());
        handler
            .create_ref(&Reference::Branch(branch_name.clone()), base_sha)
            .await
            .context("failed to create branch")?;

        match self.existing_readme_sha(repo, &default_branch).await {
            Some(sha) => {
                handler
                    .update_file(README_PATH, COMMIT_MESSAGE, readme, sha)
                    .branch(&branch_name)
                    .send()
                    .await
                    .context("failed to update README.md")?;
            }
            None => {
                handler
                    .create_file(README_PATH, COMMIT_MESSAGE, readme)
                    .branch(&branch_name)
                    .send()
                    .await
                    .context("failed to create README.md")?;
            }
        }

        let pr = self
            .client
            .pulls(&repo.owner, &repo.repo)
            .create(PR_TITLE, &branch_name, &default_branch)
            .body(PR_BODY)
            .send()
            .await
            .context("failed to create PR")?;

        tracing::info!(
            owner = %repo.owner,
            repo = %repo.repo,
            number = pr.number,
            "opened README pull request"
        );

        Ok(PullRequestInfo {
            success: true,
            pr_url: pr.html_url.map(|u| u.to_string()),
            pr_number: pr.number,
            branch_name,
        })
    }

    /// Blob SHA of the current README on `branch`, retried with backoff
    async fn existing_readme_sha(&self, repo: &RepoRef, branch: &str) -> Option<String> {
        let max_retries = 3;
        let mut delay = Duration::from_millis(100);

        for attempt in 1..=max_retries {
            let lookup = self
                .client
                .repos(&repo.owner, &repo.repo)
                .get_content()
                .path(README_PATH)
                .r#ref(branch)
                .send()
                .await;

            match lookup {
                Ok(content) => return content.items.into_iter().next().map(|item| item.sha),
                // A 404 simply means there is no README yet
                Err(octocrab::Error::GitHub { source, .. })
                    if source.status_code.as_u16() == 404 =>
                {
                    return None;
                }
                Err(e) => {
                    tracing::warn!("Retry {}/{} for {}: {}", attempt, max_retries, README_PATH, e);
                    sleep(delay).await;
                    delay *= 2;
                }
            }
        }
        None
    }
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}
