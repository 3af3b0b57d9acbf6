//! Task requests and their up-front validation.

use std::fmt;

use crate::core::error::PipelineError;
use crate::core::types::{ModelAssignment, RepoId};

/// Everything one run needs. Immutable once the run starts.
#[derive(Clone, PartialEq, Eq)]
pub struct TaskRequest {
    pub access_token: String,
    /// `owner/name`.
    pub repository: String,
    pub base_branch: String,
    pub task: String,
    pub models: ModelAssignment,
}

impl fmt::Debug for TaskRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRequest")
            .field("access_token", &"<redacted>")
            .field("repository", &self.repository)
            .field("base_branch", &self.base_branch)
            .field("task", &self.task)
            .field("models", &self.models)
            .finish()
    }
}

impl TaskRequest {
    /// Check every field before any side effect happens.
    ///
    /// Returns the parsed repository on success, or every problem found.
    pub fn validate(&self) -> Result<RepoId, PipelineError> {
        let mut errors = Vec::new();

        if self.access_token.trim().is_empty() {
            errors.push("access token is required".to_string());
        }

        let repo = if self.repository.trim().is_empty() {
            errors.push("repository is required".to_string());
            None
        } else {
            match self.repository.parse::<RepoId>() {
                Ok(repo) => Some(repo),
                Err(err) => {
                    errors.push(err.to_string());
                    None
                }
            }
        };

        if self.base_branch.trim().is_empty() {
            errors.push("base branch is required".to_string());
        }
        if self.task.trim().is_empty() {
            errors.push("task description is required".to_string());
        }
        for role in self.models.missing_roles() {
            errors.push(format!("no model assigned for role {role}"));
        }

        match repo {
            Some(repo) if errors.is_empty() => Ok(repo),
            _ => Err(PipelineError::Validation(errors)),
        }
    }
}
