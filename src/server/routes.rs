use std::convert::Infallible;

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use chrono::{SecondsFormat, Utc};
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::oneshot;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::github::{ReadmePublisher, RepoRef};
use crate::pipeline::{GenerationRequest, ProgressSink, Stage, Style, improve_instructions};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateBody {
    #[serde(default)]
    pub repo_url: String,
    #[serde(default)]
    pub user_prompt: Option<String>,
    #[serde(default)]
    pub style: Option<Style>,
}

/// Suggestions arrive either as one string or as the scorer's list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Suggestions {
    Text(String),
    List(Vec<String>),
}

impl Suggestions {
    fn joined(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::List(items) => items.join(", "),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImproveBody {
    #[serde(default)]
    pub readme: Option<String>,
    #[serde(default)]
    pub suggestions: Option<Suggestions>,
    #[serde(default)]
    pub custom_prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePrBody {
    #[serde(default)]
    pub repo_url: Option<String>,
    #[serde(default)]
    pub readme: Option<String>,
    #[serde(default)]
    pub github_token: Option<String>,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn wants_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("text/event-stream"))
}

fn sse_event<T: Serialize>(kind: &str, data: &T) -> Event {
    Event::default()
        .event(kind)
        .json_data(data)
        .unwrap_or_else(|e| Event::default().event("error").data(e.to_string()))
}

/// POST /api/generate
pub async fn generate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<GenerateBody>,
) -> Response {
    let request = GenerationRequest::new(body.repo_url)
        .with_style(body.style.unwrap_or_default())
        .with_user_prompt(body.user_prompt);
    if request.validate().is_err() {
        return error_response(StatusCode::BAD_REQUEST, "Invalid GitHub URL");
    }

    if wants_event_stream(&headers) {
        return stream_generation(state, request).into_response();
    }

    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();
    match state
        .orchestrator
        .generate(&request, &ProgressSink::silent(), &cancel)
        .await
    {
        Ok(result) => Json(result).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "generate request failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Runs the pipeline on its own task and streams `progress` events, then a
/// single `result` or `error` event. Dropping the stream cancels the run.
fn stream_generation(
    state: AppState,
    request: GenerationRequest,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (sink, rx) = ProgressSink::channel();
    let cancel = CancellationToken::new();
    let cancel_on_drop = cancel.clone().drop_guard();
    let (done_tx, done_rx) = oneshot::channel();

    sink.running(Stage::Analysis, "Initializing agents...");
    tokio::spawn(async move {
        let outcome = state.orchestrator.generate(&request, &sink, &cancel).await;
        let _ = done_tx.send(outcome);
    });

    let progress = UnboundedReceiverStream::new(rx).map(|event| Ok(sse_event("progress", &event)));
    let finish = stream::once(async move {
        let event = match done_rx.await {
            Ok(Ok(result)) => sse_event("result", &result),
            Ok(Err(e)) => sse_event("error", &json!({ "message": e.to_string() })),
            Err(_) => sse_event("error", &json!({ "message": "Internal server error" })),
        };
        drop(cancel_on_drop);
        Ok(event)
    });

    Sse::new(progress.chain(finish)).keep_alive(KeepAlive::default())
}

/// POST /api/generate/improve
pub async fn improve(State(state): State<AppState>, Json(body): Json<ImproveBody>) -> Response {
    let Some(readme) = body.readme.filter(|r| !r.trim().is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "Missing readme content");
    };

    let suggestions = body.suggestions.as_ref().map(Suggestions::joined);
    let instructions = improve_instructions(suggestions.as_deref(), body.custom_prompt.as_deref());

    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();
    match state
        .orchestrator
        .improve(&readme, &instructions, &ProgressSink::silent(), &cancel)
        .await
    {
        Ok(result) => Json(result).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// POST /api/generate/create-pr
pub async fn create_pr(State(state): State<AppState>, Json(body): Json<CreatePrBody>) -> Response {
    let (Some(repo_url), Some(readme)) = (
        body.repo_url.filter(|u| !u.trim().is_empty()),
        body.readme.filter(|r| !r.trim().is_empty()),
    ) else {
        return error_response(StatusCode::BAD_REQUEST, "Missing repoUrl or readme content");
    };

    let Some(token) = body
        .github_token
        .filter(|t| !t.trim().is_empty())
        .or_else(|| state.github_token.clone())
    else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "GitHub token required. Provide a token with repo write access.",
        );
    };

    let Some(repo) = RepoRef::parse(&repo_url) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid GitHub URL");
    };

    let outcome = match ReadmePublisher::new(&token) {
        Ok(publisher) => publisher.open_pull_request(&repo, &readme).await,
        Err(e) => Err(e),
    };
    match outcome {
        Ok(info) => Json(info).into_response(),
        Err(e) => {
            tracing::error!(
                owner = %repo.owner,
                repo = %repo.repo,
                error = %e,
                "pull request creation failed"
            );
            error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"))
        }
    }
}

/// GET /api/health
pub async fn health() -> Json<serde_json::Value> {
    let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    Json(json!({ "status": "ok", "timestamp": timestamp }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ToolCaller;
    use crate::error::ToolError;
    use crate::pipeline::Orchestrator;
    use crate::server::router;
    use crate::tools::Tool;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use rmcp::model::JsonObject;
    use std::sync::Arc;
    use tower::ServiceExt;

    /// Answers every tool with a fixed, well-formed payload.
    struct HappyAgents;

    #[async_trait]
    impl ToolCaller for HappyAgents {
        async fn call_tool(
            &self,
            tool: Tool,
            _: JsonObject,
            _: &CancellationToken,
        ) -> Result<String, ToolError> {
            let text = match tool {
                Tool::RepoMetadata => r#"{"name":"widget","stars":12,"language":"Go"}"#,
                Tool::AnalyzeRepository => {
                    r#"{"tree":[{"path":"main.go","type":"file"}],"languages":{"Go":1}}"#
                }
                Tool::IdentifyImportantFiles => r#"["main.go"]"#,
                Tool::CommunityInsights => "{}",
                Tool::ReadFiles | Tool::SmartChunk => {
                    r#"[{"path":"main.go","content":"package main"}]"#
                }
                Tool::ExtractSignatures => r#"[{"path":"main.go","signatures":["func main()"]}]"#,
                Tool::ExtractCommands => r#"{"build":["go build"]}"#,
                Tool::GenerateReadme | Tool::EnhanceReadme => "# widget\n\nA widget.",
                Tool::ValidateReadme => r#"{"score":91,"suggestions":[]}"#,
            };
            Ok(text.to_string())
        }
    }

    /// Never answers; reports when a call starts and when its run is cancelled.
    struct StalledAgents {
        events: tokio::sync::mpsc::UnboundedSender<&'static str>,
    }

    #[async_trait]
    impl ToolCaller for StalledAgents {
        async fn call_tool(
            &self,
            _: Tool,
            _: JsonObject,
            cancel: &CancellationToken,
        ) -> Result<String, ToolError> {
            let _ = self.events.send("called");
            cancel.cancelled().await;
            let _ = self.events.send("cancelled");
            Err(ToolError::Cancelled)
        }
    }

    fn app() -> axum::Router {
        let orchestrator = Arc::new(Orchestrator::new(Arc::new(HappyAgents)));
        router(AppState::new(orchestrator))
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let response = app()
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        let timestamp = body["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
        assert!(timestamp.ends_with('Z'));
    }

    #[tokio::test]
    async fn non_github_url_is_rejected() {
        let response = app()
            .oneshot(post_json("/api/generate", json!({"repoUrl": "https://gitlab.com/a/b"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await, json!({"error": "Invalid GitHub URL"}));
    }

    #[tokio::test]
    async fn generate_returns_json_result() {
        let response = app()
            .oneshot(post_json(
                "/api/generate",
                json!({"repoUrl": "https://github.com/acme/widget", "style": "fancy"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["readme"], "# widget\n\nA widget.");
        assert_eq!(body["quality"]["score"], 91);
        assert_eq!(body["degraded"], false);
        assert!(body.get("originalReadme").is_none());
    }

    #[tokio::test]
    async fn generate_streams_progress_then_result() {
        let mut request = post_json(
            "/api/generate",
            json!({"repoUrl": "https://github.com/acme/widget"}),
        );
        request
            .headers_mut()
            .insert(header::ACCEPT, "text/event-stream".parse().unwrap());

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();

        let first = text.find("Initializing agents...").unwrap();
        let result = text.find("event: result").unwrap();
        assert!(first < result);
        assert!(text.contains("\"step\":\"quality\""));
        assert!(!text.contains("event: error"));
    }

    #[tokio::test]
    async fn disconnecting_from_the_stream_cancels_the_run() {
        let (tx, mut events) = tokio::sync::mpsc::unbounded_channel();
        let orchestrator = Arc::new(Orchestrator::new(Arc::new(StalledAgents { events: tx })));
        let mut request = post_json(
            "/api/generate",
            json!({"repoUrl": "https://github.com/acme/widget"}),
        );
        request
            .headers_mut()
            .insert(header::ACCEPT, "text/event-stream".parse().unwrap());

        let response = router(AppState::new(orchestrator)).oneshot(request).await.unwrap();
        let mut body = response.into_body().into_data_stream();
        let first = body.next().await.unwrap().unwrap();
        assert!(String::from_utf8_lossy(&first).contains("Initializing agents..."));
        assert_eq!(events.recv().await, Some("called"));
        drop(body);

        let next = tokio::time::timeout(std::time::Duration::from_secs(5), events.recv())
            .await
            .expect("run kept going after the client left");
        assert_eq!(next, Some("cancelled"));
    }

    #[tokio::test]
    async fn improve_requires_a_readme() {
        let response = app()
            .oneshot(post_json("/api/generate/improve", json!({"suggestions": "x"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn improve_returns_rescored_readme() {
        let response = app()
            .oneshot(post_json(
                "/api/generate/improve",
                json!({"readme": "# old", "suggestions": ["Add badges"], "customPrompt": "short"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["readme"], "# widget\n\nA widget.");
        assert_eq!(body["quality"]["score"], 91);
    }

    #[tokio::test]
    async fn create_pr_needs_a_token() {
        let response = app()
            .oneshot(post_json(
                "/api/generate/create-pr",
                json!({"repoUrl": "https://github.com/acme/widget", "readme": "# widget"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().starts_with("GitHub token required"));
    }
}
