//! Shared deterministic types for orchestrator core logic.
//!
//! These types define stable contracts between the stage agents, the
//! collaborators and the orchestrator. They do not depend on external state.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

/// One of the six generation-backed pipeline roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StageRole {
    Planner,
    BranchNamer,
    #[serde(alias = "embedder")]
    Analyzer,
    #[serde(alias = "developer")]
    Implementer,
    Reviewer,
    PrWriter,
}

impl StageRole {
    /// Every role, in pipeline order.
    pub const ALL: [StageRole; 6] = [
        StageRole::Planner,
        StageRole::BranchNamer,
        StageRole::Analyzer,
        StageRole::Implementer,
        StageRole::Reviewer,
        StageRole::PrWriter,
    ];

    /// Stable key used in config files and request bodies.
    pub fn as_str(self) -> &'static str {
        match self {
            StageRole::Planner => "planner",
            StageRole::BranchNamer => "branchNamer",
            StageRole::Analyzer => "analyzer",
            StageRole::Implementer => "implementer",
            StageRole::Reviewer => "reviewer",
            StageRole::PrWriter => "prWriter",
        }
    }
}

impl fmt::Display for StageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "planner" => Ok(StageRole::Planner),
            "branchNamer" | "branch-namer" | "branch_namer" => Ok(StageRole::BranchNamer),
            "analyzer" | "embedder" => Ok(StageRole::Analyzer),
            "implementer" | "developer" => Ok(StageRole::Implementer),
            "reviewer" => Ok(StageRole::Reviewer),
            "prWriter" | "pr-writer" | "pr_writer" => Ok(StageRole::PrWriter),
            other => Err(anyhow!("unknown stage role '{other}'")),
        }
    }
}

/// Model id per stage role.
///
/// Unknown keys are rejected at deserialization time; missing or blank
/// entries are reported by request validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelAssignment(BTreeMap<StageRole, String>);

impl ModelAssignment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign `model` to `role`, replacing any previous assignment.
    pub fn set(&mut self, role: StageRole, model: impl Into<String>) {
        self.0.insert(role, model.into());
    }

    pub fn with(mut self, role: StageRole, model: impl Into<String>) -> Self {
        self.set(role, model);
        self
    }

    /// Model for `role`, if assigned and non-blank.
    pub fn get(&self, role: StageRole) -> Option<&str> {
        self.0
            .get(&role)
            .map(|m| m.trim())
            .filter(|m| !m.is_empty())
    }

    /// Roles with no usable model, in pipeline order.
    pub fn missing_roles(&self) -> Vec<StageRole> {
        StageRole::ALL
            .into_iter()
            .filter(|role| self.get(*role).is_none())
            .collect()
    }

    /// Overlay `other` on top of `self`; blank entries in `other` are ignored.
    pub fn merged(mut self, other: &ModelAssignment) -> Self {
        for role in StageRole::ALL {
            if let Some(model) = other.get(role) {
                self.set(role, model);
            }
        }
        self
    }
}

impl FromIterator<(StageRole, String)> for ModelAssignment {
    fn from_iter<I: IntoIterator<Item = (StageRole, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// `owner/name` repository identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoId {
    pub owner: String,
    pub name: String,
}

impl RepoId {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for RepoId {
    type Err = anyhow::Error;

    /// Parse `owner/name`. Each part may only contain ASCII alphanumerics,
    /// `-`, `_` and `.`, and may not be `.` or `..`.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let (owner, name) = trimmed
            .split_once('/')
            .ok_or_else(|| anyhow!("repository '{trimmed}' must have the form owner/name"))?;
        for (label, part) in [("owner", owner), ("name", name)] {
            if !is_valid_repo_part(part) {
                return Err(anyhow!("repository {label} '{part}' is not a valid name"));
            }
        }
        Ok(Self::new(owner, name))
    }
}

fn is_valid_repo_part(part: &str) -> bool {
    !part.is_empty()
        && part != "."
        && part != ".."
        && part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Opaque handle to a run-exclusive local checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingCopy {
    path: PathBuf,
}

impl WorkingCopy {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// How a file was touched by the implementer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Created,
    Modified,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    /// Path relative to the working copy root, `/`-separated.
    pub path: String,
    pub action: ChangeAction,
}

/// Edits produced by the implementer stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub summary: String,
    pub files: Vec<FileChange>,
}

impl ChangeSet {
    /// Markdown bullet list of touched files, used in prompts.
    pub fn file_list(&self) -> String {
        self.files
            .iter()
            .map(|f| format!("- {} ({})", f.path, action_label(f.action)))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn action_label(action: ChangeAction) -> &'static str {
    match action {
        ChangeAction::Created => "created",
        ChangeAction::Modified => "modified",
    }
}

/// Reviewer verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResult {
    pub has_improvements: bool,
    pub summary: String,
    pub improvements: Vec<String>,
}

impl ReviewResult {
    /// Improvements as numbered text for the implementer's second pass.
    pub fn improvements_text(&self) -> String {
        self.improvements
            .iter()
            .enumerate()
            .map(|(i, item)| format!("{}. {}", i + 1, item.trim()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Title and body for the eventual pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestContent {
    pub title: String,
    pub body: String,
}

/// Reference to an opened pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestRef {
    pub url: String,
    pub number: u64,
}
