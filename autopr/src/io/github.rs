//! Repository hosting operations over the GitHub REST API.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::core::types::{PullRequestRef, RepoId};

const PER_PAGE: usize = 100;
/// Upper bound on pages fetched for one listing.
const MAX_PAGES: usize = 10;

/// A repository the token can access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySummary {
    pub full_name: String,
    pub name: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub default_branch: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchSummary {
    pub name: String,
    #[serde(default)]
    pub protected: bool,
}

/// Pull request to open from `head` onto `base`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewPullRequest {
    pub title: String,
    pub head: String,
    pub base: String,
    pub body: String,
}

/// Hosting-side operations, authenticated per call.
pub trait HostingOps: Send + Sync {
    fn list_repositories(&self, token: &str) -> Result<Vec<RepositorySummary>>;

    fn list_branches(&self, token: &str, repo: &RepoId) -> Result<Vec<BranchSummary>>;

    fn create_pull_request(
        &self,
        token: &str,
        repo: &RepoId,
        pull_request: &NewPullRequest,
    ) -> Result<PullRequestRef>;
}

#[derive(Deserialize)]
struct PullRequestResponse {
    html_url: String,
    number: u64,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorDetail>,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

/// [`HostingOps`] for github.com or a GitHub Enterprise API base.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: Client,
    api_base_url: String,
}

impl GitHubClient {
    pub fn new(api_base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("autopr"));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .context("build github http client")?;
        Ok(Self {
            client,
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url, path)
    }

    fn get_paged<T: DeserializeOwned>(&self, token: &str, path: &str) -> Result<Vec<T>> {
        let mut items = Vec::new();
        for page in 1..=MAX_PAGES {
            let separator = if path.contains('?') { '&' } else { '?' };
            let url = self.url(&format!("{path}{separator}per_page={PER_PAGE}&page={page}"));
            let body = send(self.client.get(&url).bearer_auth(token), &url)?;
            let batch: Vec<T> =
                serde_json::from_str(&body).with_context(|| format!("parse response of {url}"))?;
            let len = batch.len();
            items.extend(batch);
            if len < PER_PAGE {
                break;
            }
        }
        Ok(items)
    }
}

impl HostingOps for GitHubClient {
    #[instrument(skip_all)]
    fn list_repositories(&self, token: &str) -> Result<Vec<RepositorySummary>> {
        let repos: Vec<RepositorySummary> =
            self.get_paged(token, "/user/repos?sort=updated")?;
        debug!(count = repos.len(), "listed repositories");
        Ok(repos)
    }

    #[instrument(skip_all, fields(repo = %repo))]
    fn list_branches(&self, token: &str, repo: &RepoId) -> Result<Vec<BranchSummary>> {
        let path = format!("/repos/{}/{}/branches", repo.owner, repo.name);
        let branches: Vec<BranchSummary> = self.get_paged(token, &path)?;
        debug!(count = branches.len(), "listed branches");
        Ok(branches)
    }

    #[instrument(skip_all, fields(repo = %repo, head = %pull_request.head, base = %pull_request.base))]
    fn create_pull_request(
        &self,
        token: &str,
        repo: &RepoId,
        pull_request: &NewPullRequest,
    ) -> Result<PullRequestRef> {
        let url = self.url(&format!("/repos/{}/{}/pulls", repo.owner, repo.name));
        let body = send(
            self.client.post(&url).bearer_auth(token).json(pull_request),
            &url,
        )?;
        let created: PullRequestResponse =
            serde_json::from_str(&body).context("parse created pull request")?;
        info!(number = created.number, url = %created.html_url, "pull request created");
        Ok(PullRequestRef {
            url: created.html_url,
            number: created.number,
        })
    }
}

fn send(request: RequestBuilder, url: &str) -> Result<String> {
    let response = request
        .send()
        .with_context(|| format!("request {url}"))?;
    let status = response.status();
    let body = response
        .text()
        .with_context(|| format!("read response of {url}"))?;
    if !status.is_success() {
        warn!(%status, url, "github request failed");
        return Err(anyhow!(
            "github {url} returned {status}: {}",
            error_message(&body)
        ));
    }
    Ok(body)
}

/// Human-readable message from a GitHub error body.
fn error_message(body: &str) -> String {
    let Ok(error) = serde_json::from_str::<ApiError>(body) else {
        return body.trim().to_string();
    };
    let details: Vec<String> = error
        .errors
        .into_iter()
        .filter_map(|d| d.message.or(d.code))
        .collect();
    if details.is_empty() {
        error.message
    } else {
        format!("{} ({})", error.message, details.join("; "))
    }
}
