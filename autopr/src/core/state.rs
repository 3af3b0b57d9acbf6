//! Per-run pipeline state as an explicit forward-only state machine.
//!
//! Every completed transition stores its output and advances [`RunPhase`] by
//! exactly one step. Fields are never cleared once set, so the phase and the
//! populated fields always agree.

use serde::Serialize;

use crate::core::types::{ChangeSet, PullRequestContent, PullRequestRef, ReviewResult, WorkingCopy};

/// Position of a run in the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    #[default]
    NotStarted,
    Planned,
    Named,
    Cloned,
    Branched,
    Analyzed,
    Implemented,
    Reviewed,
    Finalized,
    PrWritten,
    PrOpened,
    Aborted,
}

impl RunPhase {
    /// The phase a successful transition from `self` leads to.
    pub fn next(self) -> Option<RunPhase> {
        use RunPhase as P;
        match self {
            P::NotStarted => Some(P::Planned),
            P::Planned => Some(P::Named),
            P::Named => Some(P::Cloned),
            P::Cloned => Some(P::Branched),
            P::Branched => Some(P::Analyzed),
            P::Analyzed => Some(P::Implemented),
            P::Implemented => Some(P::Reviewed),
            P::Reviewed => Some(P::Finalized),
            P::Finalized => Some(P::PrWritten),
            P::PrWritten => Some(P::PrOpened),
            P::PrOpened | P::Aborted => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::PrOpened | RunPhase::Aborted)
    }
}

/// A transition was attempted out of order or a required output is absent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("cannot move from {from:?} to {to:?}")]
    OutOfOrder { from: RunPhase, to: RunPhase },
    #[error("{0} is not available yet")]
    Missing(&'static str),
    #[error("review improvements can only be applied once, right after review")]
    ImprovementsOutOfOrder,
}

/// Mutable state owned by exactly one run.
#[derive(Debug, Clone, Default)]
pub struct RunState {
    phase: RunPhase,
    plan: Option<String>,
    branch_name: Option<String>,
    working_copy: Option<WorkingCopy>,
    codebase_context: Option<String>,
    change_set: Option<ChangeSet>,
    review: Option<ReviewResult>,
    improvements_applied: bool,
    pull_request_content: Option<PullRequestContent>,
    pull_request: Option<PullRequestRef>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn record_plan(&mut self, plan: String) -> Result<(), StateError> {
        self.advance(RunPhase::Planned)?;
        self.plan = Some(plan);
        Ok(())
    }

    pub fn record_branch_name(&mut self, name: String) -> Result<(), StateError> {
        self.advance(RunPhase::Named)?;
        self.branch_name = Some(name);
        Ok(())
    }

    pub fn record_working_copy(&mut self, working_copy: WorkingCopy) -> Result<(), StateError> {
        self.advance(RunPhase::Cloned)?;
        self.working_copy = Some(working_copy);
        Ok(())
    }

    pub fn record_branch_created(&mut self) -> Result<(), StateError> {
        self.advance(RunPhase::Branched)
    }

    pub fn record_codebase_context(&mut self, context: String) -> Result<(), StateError> {
        self.advance(RunPhase::Analyzed)?;
        self.codebase_context = Some(context);
        Ok(())
    }

    pub fn record_change_set(&mut self, change_set: ChangeSet) -> Result<(), StateError> {
        self.advance(RunPhase::Implemented)?;
        self.change_set = Some(change_set);
        Ok(())
    }

    pub fn record_review(&mut self, review: ReviewResult) -> Result<(), StateError> {
        self.advance(RunPhase::Reviewed)?;
        self.review = Some(review);
        Ok(())
    }

    /// Mark the conditional improvement pass as done.
    ///
    /// Only valid while `Reviewed`, once, and only if the review asked for
    /// improvements. Does not advance the phase or touch the change set.
    pub fn record_improvements_applied(&mut self) -> Result<(), StateError> {
        let wanted = self.review.as_ref().is_some_and(|r| r.has_improvements);
        if self.phase != RunPhase::Reviewed || self.improvements_applied || !wanted {
            return Err(StateError::ImprovementsOutOfOrder);
        }
        self.improvements_applied = true;
        Ok(())
    }

    pub fn record_finalized(&mut self) -> Result<(), StateError> {
        self.advance(RunPhase::Finalized)
    }

    pub fn record_pull_request_content(
        &mut self,
        content: PullRequestContent,
    ) -> Result<(), StateError> {
        self.advance(RunPhase::PrWritten)?;
        self.pull_request_content = Some(content);
        Ok(())
    }

    pub fn record_pull_request(&mut self, pr: PullRequestRef) -> Result<(), StateError> {
        self.advance(RunPhase::PrOpened)?;
        self.pull_request = Some(pr);
        Ok(())
    }

    /// Move to `Aborted` from any non-terminal phase. Stored outputs are kept.
    pub fn abort(&mut self) {
        if !self.phase.is_terminal() {
            self.phase = RunPhase::Aborted;
        }
    }

    pub fn plan(&self) -> Result<&str, StateError> {
        self.plan.as_deref().ok_or(StateError::Missing("plan"))
    }

    pub fn branch_name(&self) -> Result<&str, StateError> {
        self.branch_name
            .as_deref()
            .ok_or(StateError::Missing("branch name"))
    }

    pub fn working_copy(&self) -> Result<&WorkingCopy, StateError> {
        self.working_copy
            .as_ref()
            .ok_or(StateError::Missing("working copy"))
    }

    pub fn codebase_context(&self) -> Result<&str, StateError> {
        self.codebase_context
            .as_deref()
            .ok_or(StateError::Missing("codebase context"))
    }

    pub fn change_set(&self) -> Result<&ChangeSet, StateError> {
        self.change_set
            .as_ref()
            .ok_or(StateError::Missing("change set"))
    }

    pub fn review(&self) -> Result<&ReviewResult, StateError> {
        self.review.as_ref().ok_or(StateError::Missing("review result"))
    }

    pub fn improvements_applied(&self) -> bool {
        self.improvements_applied
    }

    pub fn pull_request_content(&self) -> Result<&PullRequestContent, StateError> {
        self.pull_request_content
            .as_ref()
            .ok_or(StateError::Missing("pull request content"))
    }

    pub fn pull_request(&self) -> Result<&PullRequestRef, StateError> {
        self.pull_request
            .as_ref()
            .ok_or(StateError::Missing("pull request"))
    }

    fn advance(&mut self, to: RunPhase) -> Result<(), StateError> {
        if self.phase.next() != Some(to) {
            return Err(StateError::OutOfOrder {
                from: self.phase,
                to,
            });
        }
        self.phase = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ChangeAction, FileChange};

    fn review(has_improvements: bool) -> ReviewResult {
        ReviewResult {
            has_improvements,
            summary: "looks fine".to_string(),
            improvements: if has_improvements {
                vec!["add a test".to_string()]
            } else {
                Vec::new()
            },
        }
    }

    fn reviewed_state(has_improvements: bool) -> RunState {
        let mut state = RunState::new();
        state.record_plan("1. do it".into()).expect("plan");
        state.record_branch_name("feature/x".into()).expect("name");
        state
            .record_working_copy(WorkingCopy::new("/tmp/wc"))
            .expect("clone");
        state.record_branch_created().expect("branch");
        state.record_codebase_context("ctx".into()).expect("analyze");
        state
            .record_change_set(ChangeSet {
                summary: "edit".into(),
                files: vec![FileChange {
                    path: "a.rs".into(),
                    action: ChangeAction::Modified,
                }],
            })
            .expect("implement");
        state.record_review(review(has_improvements)).expect("review");
        state
    }

    #[test]
    fn phases_advance_one_step_at_a_time() {
        let mut state = RunState::new();
        assert_eq!(state.phase(), RunPhase::NotStarted);
        let err = state.record_branch_name("feature/x".into()).unwrap_err();
        assert_eq!(
            err,
            StateError::OutOfOrder {
                from: RunPhase::NotStarted,
                to: RunPhase::Named
            }
        );
        state.record_plan("plan".into()).expect("plan");
        assert_eq!(state.phase(), RunPhase::Planned);
        assert_eq!(state.plan(), Ok("plan"));
        assert!(state.branch_name().is_err());
    }

    #[test]
    fn stages_cannot_rerun() {
        let mut state = RunState::new();
        state.record_plan("first".into()).expect("plan");
        assert!(state.record_plan("second".into()).is_err());
        assert_eq!(state.plan(), Ok("first"));
    }

    #[test]
    fn improvements_only_between_review_and_finalize() {
        let mut state = reviewed_state(true);
        state.record_improvements_applied().expect("apply");
        assert!(state.improvements_applied());
        assert_eq!(state.phase(), RunPhase::Reviewed);
        assert_eq!(
            state.record_improvements_applied(),
            Err(StateError::ImprovementsOutOfOrder)
        );
        state.record_finalized().expect("finalize");
    }

    #[test]
    fn improvements_rejected_when_review_is_clean() {
        let mut state = reviewed_state(false);
        assert_eq!(
            state.record_improvements_applied(),
            Err(StateError::ImprovementsOutOfOrder)
        );
    }

    #[test]
    fn abort_keeps_outputs_and_blocks_further_transitions() {
        let mut state = reviewed_state(false);
        state.abort();
        assert_eq!(state.phase(), RunPhase::Aborted);
        assert!(state.change_set().is_ok());
        assert!(state.record_finalized().is_err());
        assert!(RunPhase::Aborted.is_terminal());
    }
}
