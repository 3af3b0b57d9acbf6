//! HTTP route handlers.
//!
//! Every collaborator is blocking, so handlers hop onto the blocking pool.
//! Listing failures are logged in full and reported to the client with a
//! fixed message.

use std::collections::BTreeMap;

use anyhow::anyhow;
use axum::Router;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use autopr::core::error::PipelineError;
use autopr::core::request::TaskRequest;
use autopr::core::types::{ModelAssignment, RepoId, StageRole};
use autopr::io::generation::{ModelCatalog, ModelInfo};
use autopr::io::github::{BranchSummary, HostingOps, RepositorySummary};
use autopr::pipeline::{Orchestrator, RunOutcome};

use crate::state::AppState;
use crate::stream::{ChannelObserver, NDJSON_CONTENT_TYPE, ndjson_body};

/// The full application: `/api` routes behind a permissive CORS layer.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api", api_router())
        .layer(cors)
        .with_state(state)
}

pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/models", get(list_models))
        .route("/repos", post(list_repos))
        .route("/branches", post(list_branches))
        .route("/run-task", post(run_task))
}

/// A JSON `{"error": ...}` response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

/// Run `f` on the blocking pool; a failure is logged and replaced by
/// `public_message`.
async fn blocking<T, F>(public_message: &'static str, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    let result = tokio::task::spawn_blocking(f)
        .await
        .unwrap_or_else(|err| Err(anyhow!("worker task failed: {err}")));
    result.map_err(|err| {
        warn!(error = %format!("{err:#}"), "{public_message}");
        ApiError::internal(public_message)
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

async fn health() -> &'static str {
    "ok"
}

/// GET /api/models - models offered by the generation backend.
async fn list_models(State(state): State<AppState>) -> Result<Json<Vec<ModelInfo>>, ApiError> {
    let catalog = state.catalog.clone();
    let models = blocking("Failed to fetch models from Ollama", move || {
        catalog.list_models()
    })
    .await?;
    Ok(Json(models))
}

#[derive(Deserialize)]
struct ReposBody {
    #[serde(default)]
    token: Option<String>,
}

/// POST /api/repos - repositories the token can access.
async fn list_repos(
    State(state): State<AppState>,
    body: Result<Json<ReposBody>, JsonRejection>,
) -> Result<Json<Vec<RepositorySummary>>, ApiError> {
    let Json(body) = body?;
    let token =
        non_blank(body.token).ok_or_else(|| ApiError::bad_request("GitHub token is required"))?;
    let hosting = state.hosting.clone();
    let repos = blocking("Failed to fetch repositories", move || {
        hosting.list_repositories(&token)
    })
    .await?;
    Ok(Json(repos))
}

#[derive(Deserialize)]
struct BranchesBody {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    owner: Option<String>,
    #[serde(default)]
    repo: Option<String>,
}

/// POST /api/branches - branches of one repository.
async fn list_branches(
    State(state): State<AppState>,
    body: Result<Json<BranchesBody>, JsonRejection>,
) -> Result<Json<Vec<BranchSummary>>, ApiError> {
    let Json(body) = body?;
    let (Some(token), Some(owner), Some(name)) = (
        non_blank(body.token),
        non_blank(body.owner),
        non_blank(body.repo),
    ) else {
        return Err(ApiError::bad_request("Token, owner, and repo are required"));
    };
    let repo: RepoId = format!("{owner}/{name}")
        .parse()
        .map_err(|err: anyhow::Error| ApiError::bad_request(err.to_string()))?;
    let hosting = state.hosting.clone();
    let branches = blocking("Failed to fetch branches", move || {
        hosting.list_branches(&token, &repo)
    })
    .await?;
    Ok(Json(branches))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunTaskBody {
    #[serde(default)]
    token: String,
    #[serde(default)]
    repo: String,
    #[serde(default)]
    base_branch: String,
    #[serde(default)]
    task: String,
    #[serde(default)]
    agent_models: BTreeMap<String, String>,
}

impl RunTaskBody {
    /// Request-supplied models overlay the configured defaults.
    fn into_request(self, defaults: &ModelAssignment) -> Result<TaskRequest, ApiError> {
        let mut overrides = ModelAssignment::new();
        for (key, model) in self.agent_models {
            let role: StageRole = key
                .parse()
                .map_err(|err: anyhow::Error| ApiError::bad_request(err.to_string()))?;
            overrides.set(role, model);
        }
        Ok(TaskRequest {
            access_token: self.token,
            repository: self.repo,
            base_branch: self.base_branch,
            task: self.task,
            models: defaults.clone().merged(&overrides),
        })
    }
}

/// POST /api/run-task - validate, then stream the run as NDJSON.
///
/// Validation failures are answered with 400 before any event is produced.
/// Once streaming starts the status is 200 whatever the outcome; the last
/// frame tells success from failure.
async fn run_task(
    State(state): State<AppState>,
    body: Result<Json<RunTaskBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body?;
    let request = body.into_request(&state.default_models)?;
    if let Err(PipelineError::Validation(errors)) = request.validate() {
        return Err(ApiError::bad_request(errors.join("; ")));
    }

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::task::spawn_blocking(move || {
        let orchestrator = Orchestrator::new(
            state.generation.as_ref(),
            state.repository.as_ref(),
            state.hosting.as_ref(),
        )
        .with_limits(state.limits);
        match orchestrator.run(&request, ChannelObserver::new(tx)) {
            Ok(report) => match report.outcome {
                RunOutcome::PullRequestCreated(pr) => {
                    info!(url = %pr.url, dropped = report.dropped_events, "run finished");
                }
                RunOutcome::Aborted { stage, .. } => {
                    info!(%stage, dropped = report.dropped_events, "run aborted");
                }
            },
            Err(err) => warn!(error = %err, "run rejected"),
        }
    });

    Ok((
        [
            (header::CONTENT_TYPE, NDJSON_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        ndjson_body(rx),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    use autopr::io::codebase::SnapshotLimits;
    use autopr::progress::{ProgressEvent, Severity};
    use autopr::test_support::{
        SAMPLE_PR_NUMBER, ScriptedGeneration, ScriptedHosting, ScriptedRepository, model_for,
        sample_models,
    };

    use super::*;

    fn state_with(generation: ScriptedGeneration, hosting: ScriptedHosting) -> AppState {
        let generation = Arc::new(generation);
        AppState {
            generation: generation.clone(),
            catalog: generation,
            repository: Arc::new(ScriptedRepository::new()),
            hosting: Arc::new(hosting),
            default_models: ModelAssignment::new(),
            limits: SnapshotLimits::default(),
        }
    }

    fn happy_state() -> AppState {
        state_with(ScriptedGeneration::happy_path(), ScriptedHosting::new())
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    fn run_task_body() -> Value {
        json!({
            "token": "ghp_testtoken",
            "repo": "octo/app",
            "baseBranch": "main",
            "task": "Fix the login bug",
            "agentModels": sample_models(),
        })
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        String::from_utf8(bytes.to_vec()).expect("utf-8")
    }

    async fn error_message(response: Response) -> String {
        let value: Value = serde_json::from_str(&body_text(response).await).expect("json");
        value["error"].as_str().expect("error field").to_string()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let response = app(happy_state())
            .oneshot(Request::get("/api/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "ok");
    }

    #[tokio::test]
    async fn models_lists_the_catalog() {
        let response = app(happy_state())
            .oneshot(Request::get("/api/models").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let models: Vec<ModelInfo> =
            serde_json::from_str(&body_text(response).await).expect("json");
        assert!(
            models
                .iter()
                .any(|m| m.name == model_for(StageRole::Planner))
        );
    }

    #[tokio::test]
    async fn repos_requires_a_token() {
        let response = app(happy_state())
            .oneshot(post_json("/api/repos", json!({ "token": " " })))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_message(response).await, "GitHub token is required");
    }

    #[tokio::test]
    async fn repos_lists_repositories() {
        let response = app(happy_state())
            .oneshot(post_json("/api/repos", json!({ "token": "t" })))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let repos: Vec<RepositorySummary> =
            serde_json::from_str(&body_text(response).await).expect("json");
        assert_eq!(repos[0].full_name, "octo/app");
    }

    #[tokio::test]
    async fn hosting_failure_hides_details() {
        let state = state_with(
            ScriptedGeneration::happy_path(),
            ScriptedHosting::failing("Bad credentials for ghp_testtoken"),
        );
        let response = app(state)
            .oneshot(post_json("/api/repos", json!({ "token": "ghp_testtoken" })))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error_message(response).await, "Failed to fetch repositories");
    }

    #[tokio::test]
    async fn branches_require_owner_and_repo() {
        let response = app(happy_state())
            .oneshot(post_json(
                "/api/branches",
                json!({ "token": "t", "owner": "octo" }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            error_message(response).await,
            "Token, owner, and repo are required"
        );
    }

    #[tokio::test]
    async fn branches_list_names() {
        let response = app(happy_state())
            .oneshot(post_json(
                "/api/branches",
                json!({ "token": "t", "owner": "octo", "repo": "app" }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let branches: Vec<BranchSummary> =
            serde_json::from_str(&body_text(response).await).expect("json");
        let names: Vec<&str> = branches.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, ["develop", "main"]);
    }

    #[tokio::test]
    async fn run_task_rejects_missing_task_before_streaming() {
        let mut body = run_task_body();
        body["task"] = json!("");
        let response = app(happy_state())
            .oneshot(post_json("/api/run-task", body))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(
            error_message(response)
                .await
                .contains("task description is required")
        );
    }

    #[tokio::test]
    async fn run_task_rejects_invalid_repository_names() {
        let mut body = run_task_body();
        body["repo"] = json!("octo/../app");
        let response = app(happy_state())
            .oneshot(post_json("/api/run-task", body))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn run_task_rejects_unknown_roles() {
        let mut body = run_task_body();
        body["agentModels"]["tester"] = json!("llama3");
        let response = app(happy_state())
            .oneshot(post_json("/api/run-task", body))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn run_task_streams_the_whole_run() {
        let response = app(happy_state())
            .oneshot(post_json("/api/run-task", run_task_body()))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            NDJSON_CONTENT_TYPE
        );

        let text = body_text(response).await;
        let events: Vec<ProgressEvent> = text
            .lines()
            .map(|line| serde_json::from_str(line).expect("frame"))
            .collect();
        assert_eq!(events.len(), 20);
        assert_eq!(events[0].severity, Severity::Info);
        let last = events.last().expect("terminal");
        assert_eq!(last.severity, Severity::Success);
        let data = last.payload.as_ref().expect("payload");
        assert_eq!(data["prNumber"], SAMPLE_PR_NUMBER);
    }

    #[tokio::test]
    async fn run_task_uses_configured_models_for_missing_roles() {
        let mut state = happy_state();
        state.default_models = sample_models();
        let response = app(state)
            .oneshot(post_json(
                "/api/run-task",
                json!({
                    "token": "ghp_testtoken",
                    "repo": "octo/app",
                    "baseBranch": "main",
                    "task": "Fix the login bug",
                }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let text = body_text(response).await;
        let last: ProgressEvent =
            serde_json::from_str(text.lines().last().expect("frame")).expect("json");
        assert_eq!(last.severity, Severity::Success);
    }

    #[tokio::test]
    async fn run_task_failure_ends_with_error_frame() {
        let generation = ScriptedGeneration::happy_path()
            .fail_first(&model_for(StageRole::Planner), "model not found");
        let response = app(state_with(generation, ScriptedHosting::new()))
            .oneshot(post_json("/api/run-task", run_task_body()))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let text = body_text(response).await;
        let events: Vec<ProgressEvent> = text
            .lines()
            .map(|line| serde_json::from_str(line).expect("frame"))
            .collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].severity, Severity::Error);
        assert!(events[1].message.contains("model not found"));
    }

    #[tokio::test]
    async fn malformed_json_is_a_bad_request() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/run-task")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .expect("request");
        let response = app(happy_state()).oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
