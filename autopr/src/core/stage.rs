//! Pipeline stages and their progress wording.

use std::fmt;

use serde::Serialize;

/// Which failure class a stage belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    /// Backed by one generation call.
    Generation,
    /// Backed by a repository or hosting operation.
    Operation,
}

/// One step of the orchestrator pipeline, in execution order.
///
/// [`Stage::ApplyImprovements`] is the conditional sub-step after review; it
/// mutates the working copy but has no position of its own in [`RunPhase`].
///
/// [`RunPhase`]: crate::core::state::RunPhase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Plan,
    NameBranch,
    Clone,
    CreateBranch,
    Analyze,
    Implement,
    Review,
    ApplyImprovements,
    Finalize,
    WritePullRequest,
    OpenPullRequest,
}

impl Stage {
    /// The ten mandatory transitions, in order.
    pub const PIPELINE: [Stage; 10] = [
        Stage::Plan,
        Stage::NameBranch,
        Stage::Clone,
        Stage::CreateBranch,
        Stage::Analyze,
        Stage::Implement,
        Stage::Review,
        Stage::Finalize,
        Stage::WritePullRequest,
        Stage::OpenPullRequest,
    ];

    pub fn kind(self) -> StageKind {
        match self {
            Stage::Plan
            | Stage::NameBranch
            | Stage::Analyze
            | Stage::Implement
            | Stage::Review
            | Stage::ApplyImprovements
            | Stage::WritePullRequest => StageKind::Generation,
            Stage::Clone | Stage::CreateBranch | Stage::Finalize | Stage::OpenPullRequest => {
                StageKind::Operation
            }
        }
    }

    /// Short label used in error messages and logs.
    pub fn label(self) -> &'static str {
        match self {
            Stage::Plan => "planner",
            Stage::NameBranch => "branch namer",
            Stage::Clone => "clone",
            Stage::CreateBranch => "create branch",
            Stage::Analyze => "codebase analyzer",
            Stage::Implement => "implementer",
            Stage::Review => "reviewer",
            Stage::ApplyImprovements => "apply improvements",
            Stage::Finalize => "commit and push",
            Stage::WritePullRequest => "pr writer",
            Stage::OpenPullRequest => "create pull request",
        }
    }

    /// `info` message announcing the stage.
    pub fn start_message(self) -> &'static str {
        match self {
            Stage::Plan => "Planning task decomposition...",
            Stage::NameBranch => "Generating branch name...",
            Stage::Clone => "Cloning repository...",
            Stage::CreateBranch => "Creating new branch...",
            Stage::Analyze => "Analyzing codebase...",
            Stage::Implement => "Implementing changes...",
            Stage::Review => "Reviewing changes...",
            Stage::ApplyImprovements => "Applying review improvements...",
            Stage::Finalize => "Committing and pushing changes...",
            Stage::WritePullRequest => "Generating pull request content...",
            Stage::OpenPullRequest => "Creating pull request...",
        }
    }

    /// `success` message reporting the stage's completion.
    pub fn success_message(self) -> &'static str {
        match self {
            Stage::Plan => "Task plan generated",
            Stage::NameBranch => "Branch name generated",
            Stage::Clone => "Repository cloned successfully",
            Stage::CreateBranch => "New branch created",
            Stage::Analyze => "Codebase analysis completed",
            Stage::Implement => "Changes implemented",
            Stage::Review => "Changes reviewed",
            Stage::ApplyImprovements => "Review improvements applied",
            Stage::Finalize => "Changes committed and pushed",
            Stage::WritePullRequest => "Pull request content generated",
            Stage::OpenPullRequest => "Pull request created successfully!",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
