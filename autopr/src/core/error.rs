//! Failure taxonomy surfaced by the orchestrator.

use crate::core::stage::{Stage, StageKind};
use crate::core::state::StateError;

/// Why a run was rejected or aborted.
///
/// Adapters and agents report causes as [`anyhow::Error`]; the orchestrator
/// classifies them by the stage they occurred in.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The request was rejected before any side effect.
    #[error("invalid task request:\n- {}", .0.join("\n- "))]
    Validation(Vec<String>),

    /// A stage agent could not produce usable output.
    #[error("{stage} failed: {cause:#}")]
    Generation { stage: Stage, cause: anyhow::Error },

    /// A repository or hosting operation failed.
    #[error("{stage} failed: {cause:#}")]
    Operation { stage: Stage, cause: anyhow::Error },

    /// The orchestrator attempted an out-of-order transition.
    #[error("{stage} failed: {cause}")]
    State { stage: Stage, cause: StateError },
}

impl PipelineError {
    /// Classify `cause` by the kind of `stage` it happened in.
    pub fn at(stage: Stage, cause: anyhow::Error) -> Self {
        match stage.kind() {
            StageKind::Generation => PipelineError::Generation { stage, cause },
            StageKind::Operation => PipelineError::Operation { stage, cause },
        }
    }

    /// Stage the run aborted in; `None` for validation failures.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::Validation(_) => None,
            PipelineError::Generation { stage, .. }
            | PipelineError::Operation { stage, .. }
            | PipelineError::State { stage, .. } => Some(*stage),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, PipelineError::Validation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, anyhow};

    #[test]
    fn at_classifies_by_stage_kind() {
        let err = PipelineError::at(Stage::Clone, anyhow!("auth failed"));
        assert!(matches!(err, PipelineError::Operation { .. }));
        let err = PipelineError::at(Stage::Plan, anyhow!("timeout"));
        assert!(matches!(err, PipelineError::Generation { .. }));
    }

    #[test]
    fn display_includes_stage_and_cause_chain() {
        let cause = Err::<(), _>(anyhow!("connection refused"))
            .context("git clone")
            .unwrap_err();
        let err = PipelineError::at(Stage::Clone, cause);
        assert_eq!(err.to_string(), "clone failed: git clone: connection refused");
        assert_eq!(err.stage(), Some(Stage::Clone));
    }

    #[test]
    fn validation_lists_every_problem() {
        let err = PipelineError::Validation(vec!["a missing".into(), "b missing".into()]);
        assert_eq!(err.to_string(), "invalid task request:\n- a missing\n- b missing");
        assert!(err.is_validation());
        assert_eq!(err.stage(), None);
    }
}
