//! Scripted collaborators and fixtures for pipeline tests.
//!
//! Everything here is deterministic and offline: generation replies are
//! queued per model id, repository operations act on a scratch directory,
//! and hosting calls are recorded instead of sent.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use tempfile::TempDir;

use crate::core::request::TaskRequest;
use crate::core::types::{ModelAssignment, PullRequestRef, RepoId, StageRole, WorkingCopy};
use crate::io::generation::{GenerationClient, ModelCatalog, ModelInfo};
use crate::io::git::RepositoryOps;
use crate::io::github::{BranchSummary, HostingOps, NewPullRequest, RepositorySummary};
use crate::progress::{ObserverGone, ProgressEvent, ProgressObserver};

/// Model id assigned to `role` by [`sample_request`].
pub fn model_for(role: StageRole) -> String {
    format!("{}-model", role.as_str())
}

/// Every role assigned to its own model id, so replies can be scripted per role.
pub fn sample_models() -> ModelAssignment {
    StageRole::ALL
        .into_iter()
        .map(|role| (role, model_for(role)))
        .collect()
}

/// A fully populated, valid request.
pub fn sample_request() -> TaskRequest {
    TaskRequest {
        access_token: "ghp_testtoken".to_string(),
        repository: "octo/app".to_string(),
        base_branch: "main".to_string(),
        task: "Fix the login bug".to_string(),
        models: sample_models(),
    }
}

pub const SAMPLE_PLAN: &str = "1. Find the login handler\n2. Fix the comparison\n3. Add a test";
pub const SAMPLE_EDITS: &str = r#"{"summary": "Fix password comparison", "files": [{"path": "src/login.rs", "content": "pub fn login(a: &str, b: &str) -> bool { a == b }\n"}]}"#;
pub const SAMPLE_IMPROVEMENT_EDITS: &str = r#"{"summary": "Add docs", "files": [{"path": "src/login.rs", "content": "/// Compares credentials.\npub fn login(a: &str, b: &str) -> bool { a == b }\n"}]}"#;
pub const CLEAN_REVIEW: &str = r#"{"approved": true, "summary": "Looks correct", "improvements": []}"#;
pub const REVIEW_WITH_IMPROVEMENTS: &str =
    r#"{"approved": false, "summary": "Works but undocumented", "improvements": ["Document login()"]}"#;
pub const SAMPLE_PULL_REQUEST: &str =
    r#"{"title": "Fix login comparison", "body": "Fixes the password comparison in `login`."}"#;

/// One recorded generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationCall {
    pub model: String,
    pub prompt: String,
    pub system: String,
}

/// [`GenerationClient`] that replays queued replies per model id.
#[derive(Debug, Default)]
pub struct ScriptedGeneration {
    replies: Mutex<HashMap<String, VecDeque<Result<String, String>>>>,
    calls: Mutex<Vec<GenerationCall>>,
}

impl ScriptedGeneration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replies for a run where every stage succeeds and the review is clean.
    pub fn happy_path() -> Self {
        Self::new()
            .reply(&model_for(StageRole::Planner), SAMPLE_PLAN)
            .reply(&model_for(StageRole::BranchNamer), "Fix the Login Bug!!")
            .reply(&model_for(StageRole::Analyzer), "Rust crate; login lives in src/login.rs")
            .reply(&model_for(StageRole::Implementer), SAMPLE_EDITS)
            .reply(&model_for(StageRole::Reviewer), CLEAN_REVIEW)
            .reply(&model_for(StageRole::PrWriter), SAMPLE_PULL_REQUEST)
    }

    /// Like [`happy_path`](Self::happy_path), but the reviewer asks for one
    /// improvement and the implementer answers it.
    pub fn with_improvements() -> Self {
        Self::new()
            .reply(&model_for(StageRole::Planner), SAMPLE_PLAN)
            .reply(&model_for(StageRole::BranchNamer), "fix/login-comparison")
            .reply(&model_for(StageRole::Analyzer), "Rust crate; login lives in src/login.rs")
            .reply(&model_for(StageRole::Implementer), SAMPLE_EDITS)
            .reply(&model_for(StageRole::Reviewer), REVIEW_WITH_IMPROVEMENTS)
            .reply(&model_for(StageRole::Implementer), SAMPLE_IMPROVEMENT_EDITS)
            .reply(&model_for(StageRole::PrWriter), SAMPLE_PULL_REQUEST)
    }

    pub fn reply(self, model: &str, text: &str) -> Self {
        self.push(model, Ok(text.to_string()));
        self
    }

    pub fn fail(self, model: &str, message: &str) -> Self {
        self.push(model, Err(message.to_string()));
        self
    }

    /// Put a failure in front of the queued replies for `model`.
    pub fn fail_first(self, model: &str, message: &str) -> Self {
        self.replies
            .lock()
            .expect("replies lock")
            .entry(model.to_string())
            .or_default()
            .push_front(Err(message.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<GenerationCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn calls_for(&self, model: &str) -> Vec<GenerationCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.model == model)
            .collect()
    }

    fn push(&self, model: &str, reply: Result<String, String>) {
        self.replies
            .lock()
            .expect("replies lock")
            .entry(model.to_string())
            .or_default()
            .push_back(reply);
    }
}

impl GenerationClient for ScriptedGeneration {
    fn generate(&self, model: &str, prompt: &str, system: &str) -> Result<String> {
        self.calls.lock().expect("calls lock").push(GenerationCall {
            model: model.to_string(),
            prompt: prompt.to_string(),
            system: system.to_string(),
        });
        let reply = self
            .replies
            .lock()
            .expect("replies lock")
            .get_mut(model)
            .and_then(VecDeque::pop_front);
        match reply {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("no scripted reply for model '{model}'")),
        }
    }
}

impl ModelCatalog for ScriptedGeneration {
    /// Every model that has scripted replies, sorted.
    fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let mut names: Vec<String> = self
            .replies
            .lock()
            .expect("replies lock")
            .keys()
            .cloned()
            .collect();
        names.sort();
        Ok(names
            .into_iter()
            .map(|name| ModelInfo {
                name,
                size: None,
                modified_at: None,
            })
            .collect())
    }
}

/// Repository operation kinds, for failure injection and call records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepoOp {
    Clone,
    CreateBranch,
    Commit,
    Push,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoCall {
    Clone { repo: RepoId, base_branch: String },
    CreateBranch { name: String },
    Commit { message: String },
    Push { branch: String },
}

/// [`RepositoryOps`] over a scratch directory; clone seeds a small crate.
#[derive(Debug)]
pub struct ScriptedRepository {
    root: TempDir,
    failures: Mutex<HashMap<RepoOp, String>>,
    calls: Mutex<Vec<RepoCall>>,
}

impl ScriptedRepository {
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().expect("scratch dir"),
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(self, op: RepoOp, message: &str) -> Self {
        self.failures
            .lock()
            .expect("failures lock")
            .insert(op, message.to_string());
        self
    }

    pub fn calls(&self) -> Vec<RepoCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    fn record(&self, op: RepoOp, call: RepoCall) -> Result<()> {
        self.calls.lock().expect("calls lock").push(call);
        match self.failures.lock().expect("failures lock").get(&op) {
            Some(message) => Err(anyhow!(message.clone())),
            None => Ok(()),
        }
    }
}

impl Default for ScriptedRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl RepositoryOps for ScriptedRepository {
    fn clone_repository(&self, _token: &str, repo: &RepoId, base_branch: &str) -> Result<WorkingCopy> {
        self.record(
            RepoOp::Clone,
            RepoCall::Clone {
                repo: repo.clone(),
                base_branch: base_branch.to_string(),
            },
        )?;
        let dir = self.root.path().join(format!("{}-{}", repo.owner, repo.name));
        fs::create_dir_all(dir.join("src"))?;
        fs::write(dir.join("README.md"), "# app\n")?;
        fs::write(dir.join("src/login.rs"), "pub fn login(a: &str, b: &str) -> bool { a != b }\n")?;
        Ok(WorkingCopy::new(dir))
    }

    fn create_branch(&self, _working_copy: &WorkingCopy, name: &str) -> Result<()> {
        self.record(
            RepoOp::CreateBranch,
            RepoCall::CreateBranch {
                name: name.to_string(),
            },
        )
    }

    fn commit(&self, _working_copy: &WorkingCopy, message: &str) -> Result<()> {
        self.record(
            RepoOp::Commit,
            RepoCall::Commit {
                message: message.to_string(),
            },
        )
    }

    fn push(&self, _working_copy: &WorkingCopy, branch: &str) -> Result<()> {
        self.record(
            RepoOp::Push,
            RepoCall::Push {
                branch: branch.to_string(),
            },
        )
    }
}

/// [`HostingOps`] that records pull requests instead of opening them.
#[derive(Debug, Default)]
pub struct ScriptedHosting {
    failure: Option<String>,
    created: Mutex<Vec<(RepoId, NewPullRequest)>>,
}

/// Number assigned to every pull request [`ScriptedHosting`] "opens".
pub const SAMPLE_PR_NUMBER: u64 = 42;

impl ScriptedHosting {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails with `message`.
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            created: Mutex::new(Vec::new()),
        }
    }

    pub fn created(&self) -> Vec<(RepoId, NewPullRequest)> {
        self.created.lock().expect("created lock").clone()
    }

    fn check(&self) -> Result<()> {
        match &self.failure {
            Some(message) => Err(anyhow!(message.clone())),
            None => Ok(()),
        }
    }
}

impl HostingOps for ScriptedHosting {
    fn list_repositories(&self, _token: &str) -> Result<Vec<RepositorySummary>> {
        self.check()?;
        Ok(vec![RepositorySummary {
            full_name: "octo/app".to_string(),
            name: "app".to_string(),
            private: false,
            default_branch: Some("main".to_string()),
            description: None,
        }])
    }

    fn list_branches(&self, _token: &str, _repo: &RepoId) -> Result<Vec<BranchSummary>> {
        self.check()?;
        Ok(vec![
            BranchSummary {
                name: "develop".to_string(),
                protected: false,
            },
            BranchSummary {
                name: "main".to_string(),
                protected: true,
            },
        ])
    }

    fn create_pull_request(
        &self,
        _token: &str,
        repo: &RepoId,
        pull_request: &NewPullRequest,
    ) -> Result<PullRequestRef> {
        self.check()?;
        self.created
            .lock()
            .expect("created lock")
            .push((repo.clone(), pull_request.clone()));
        Ok(PullRequestRef {
            url: format!("https://github.com/{repo}/pull/{SAMPLE_PR_NUMBER}"),
            number: SAMPLE_PR_NUMBER,
        })
    }
}

/// Observer that keeps every event, optionally going away after `limit`.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    pub events: Vec<ProgressEvent>,
    limit: Option<usize>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `limit` events, then report the observer as gone.
    pub fn disconnecting_after(limit: usize) -> Self {
        Self {
            events: Vec::new(),
            limit: Some(limit),
        }
    }

    pub fn messages(&self) -> Vec<&str> {
        self.events.iter().map(|e| e.message.as_str()).collect()
    }
}

impl ProgressObserver for RecordingObserver {
    fn deliver(&mut self, event: &ProgressEvent) -> Result<(), ObserverGone> {
        if self.limit.is_some_and(|limit| self.events.len() >= limit) {
            return Err(ObserverGone);
        }
        self.events.push(event.clone());
        Ok(())
    }
}
