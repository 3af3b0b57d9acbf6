//! Task orchestrator: one run from task request to opened pull request.
//!
//! A run is a strict linear sequence of ten transitions (see
//! [`Stage::PIPELINE`]) plus the conditional improvement pass after review.
//! Every transition is announced with an `info` event and confirmed with a
//! `success` event carrying its output. The first failure aborts the run with
//! a single terminal `error` event; completed side effects are left in place.

use anyhow::Context;
use serde_json::{Value, json};
use tracing::{debug, info, info_span, warn};

use crate::agents::{BranchNamer, CodebaseAnalyzer, Implementer, Planner, PrWriter, Reviewer};
use crate::core::error::PipelineError;
use crate::core::request::TaskRequest;
use crate::core::stage::Stage;
use crate::core::state::{RunState, StateError};
use crate::core::types::{PullRequestRef, RepoId, StageRole};
use crate::io::codebase::SnapshotLimits;
use crate::io::generation::GenerationClient;
use crate::io::git::RepositoryOps;
use crate::io::github::{HostingOps, NewPullRequest};
use crate::progress::{ProgressChannel, ProgressEvent, ProgressObserver};

/// How a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    PullRequestCreated(PullRequestRef),
    Aborted { stage: Stage, error: PipelineError },
}

/// Terminal outcome plus the state the run accumulated.
#[derive(Debug)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub state: RunState,
    /// Events that could not be delivered because the observer went away.
    pub dropped_events: usize,
}

impl RunReport {
    pub fn pull_request(&self) -> Option<&PullRequestRef> {
        match &self.outcome {
            RunOutcome::PullRequestCreated(pr) => Some(pr),
            RunOutcome::Aborted { .. } => None,
        }
    }
}

/// Sequences stage agents and collaborators for one run at a time.
///
/// Holds only shared, read-only collaborators; each call to [`run`](Self::run)
/// owns its own [`RunState`] and [`ProgressChannel`], so independent runs may
/// execute concurrently on separate threads.
pub struct Orchestrator<'a, G: ?Sized, R: ?Sized, H: ?Sized> {
    generation: &'a G,
    repository: &'a R,
    hosting: &'a H,
    limits: SnapshotLimits,
}

impl<'a, G, R, H> Orchestrator<'a, G, R, H>
where
    G: GenerationClient + ?Sized,
    R: RepositoryOps + ?Sized,
    H: HostingOps + ?Sized,
{
    pub fn new(generation: &'a G, repository: &'a R, hosting: &'a H) -> Self {
        Self {
            generation,
            repository,
            hosting,
            limits: SnapshotLimits::default(),
        }
    }

    /// Bounds for the codebase snapshot and the file excerpts shown to the
    /// implementer and reviewer.
    pub fn with_limits(mut self, limits: SnapshotLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Execute one run.
    ///
    /// An invalid request is rejected with [`PipelineError::Validation`]
    /// before any side effect and without touching `observer`. Otherwise the
    /// run always ends in a [`RunReport`], and `observer` has received
    /// exactly one terminal event.
    pub fn run<O: ProgressObserver>(
        &self,
        request: &TaskRequest,
        observer: O,
    ) -> Result<RunReport, PipelineError> {
        let repo = request.validate()?;
        let run_id = uuid::Uuid::new_v4();
        let span = info_span!("run", %run_id, repo = %repo);
        let _guard = span.enter();
        info!(base_branch = %request.base_branch.trim(), "run started");

        let mut run = Run {
            orchestrator: self,
            request,
            repo,
            state: RunState::new(),
            channel: ProgressChannel::open(observer),
        };
        let outcome = match run.execute() {
            Ok(pr) => {
                info!(number = pr.number, url = %pr.url, "run finished");
                run.channel.emit_terminal(ProgressEvent::success(
                    Stage::OpenPullRequest.success_message(),
                    Some(json!({ "prUrl": pr.url, "prNumber": pr.number })),
                ));
                RunOutcome::PullRequestCreated(pr)
            }
            Err(error) => {
                run.state.abort();
                warn!(error = %error, "run aborted");
                run.channel
                    .emit_terminal(ProgressEvent::error(format!("Task failed: {error}")));
                let stage = error.stage().unwrap_or(Stage::Plan);
                RunOutcome::Aborted { stage, error }
            }
        };

        debug!(
            delivered = run.channel.delivered(),
            dropped = run.channel.dropped(),
            "progress channel closed"
        );
        Ok(RunReport {
            outcome,
            dropped_events: run.channel.dropped(),
            state: run.state,
        })
    }
}

struct Run<'o, 'a, G: ?Sized, R: ?Sized, H: ?Sized, O> {
    orchestrator: &'o Orchestrator<'a, G, R, H>,
    request: &'o TaskRequest,
    repo: RepoId,
    state: RunState,
    channel: ProgressChannel<O>,
}

impl<G, R, H, O> Run<'_, '_, G, R, H, O>
where
    G: GenerationClient + ?Sized,
    R: RepositoryOps + ?Sized,
    H: HostingOps + ?Sized,
    O: ProgressObserver,
{
    /// Transitions 1-10. The final `success` event is emitted by the caller
    /// as the terminal event.
    fn execute(&mut self) -> Result<PullRequestRef, PipelineError> {
        let generation = self.orchestrator.generation;
        let repository = self.orchestrator.repository;
        let limits = self.orchestrator.limits;
        let request = self.request;
        let task = request.task.trim();
        let base_branch = request.base_branch.trim();
        let model = move |role: StageRole| request.models.get(role).unwrap_or_default();

        self.begin(Stage::Plan);
        let plan = Planner::new(generation, model(StageRole::Planner))
            .execute(task)
            .map_err(at(Stage::Plan))?;
        self.state
            .record_plan(plan.clone())
            .map_err(out_of_order(Stage::Plan))?;
        self.complete(Stage::Plan, Some(json!({ "plan": plan })));

        self.begin(Stage::NameBranch);
        let branch_name = BranchNamer::new(generation, model(StageRole::BranchNamer))
            .execute(task, &plan)
            .map_err(at(Stage::NameBranch))?;
        self.state
            .record_branch_name(branch_name.clone())
            .map_err(out_of_order(Stage::NameBranch))?;
        self.complete(Stage::NameBranch, Some(json!({ "branchName": branch_name })));

        self.begin(Stage::Clone);
        let working_copy = repository
            .clone_repository(&request.access_token, &self.repo, base_branch)
            .with_context(|| format!("clone {} at {base_branch}", self.repo))
            .map_err(at(Stage::Clone))?;
        self.state
            .record_working_copy(working_copy.clone())
            .map_err(out_of_order(Stage::Clone))?;
        self.complete(Stage::Clone, None);

        self.begin(Stage::CreateBranch);
        repository
            .create_branch(&working_copy, &branch_name)
            .map_err(at(Stage::CreateBranch))?;
        self.state
            .record_branch_created()
            .map_err(out_of_order(Stage::CreateBranch))?;
        self.complete(Stage::CreateBranch, Some(json!({ "branchName": branch_name })));

        self.begin(Stage::Analyze);
        let codebase_context = CodebaseAnalyzer::new(generation, model(StageRole::Analyzer), limits)
            .execute(&working_copy, &self.repo, task)
            .map_err(at(Stage::Analyze))?;
        self.state
            .record_codebase_context(codebase_context.clone())
            .map_err(out_of_order(Stage::Analyze))?;
        self.complete(Stage::Analyze, None);

        let implementer = Implementer::new(
            generation,
            model(StageRole::Implementer),
            limits.max_file_bytes,
        );
        self.begin(Stage::Implement);
        let change_set = implementer
            .execute(&working_copy, task, &plan, &codebase_context)
            .map_err(at(Stage::Implement))?;
        self.state
            .record_change_set(change_set.clone())
            .map_err(out_of_order(Stage::Implement))?;
        self.complete(Stage::Implement, Some(json!({ "changes": change_set })));

        self.begin(Stage::Review);
        let review = Reviewer::new(generation, model(StageRole::Reviewer), limits.max_file_bytes)
            .execute(&working_copy, &change_set, task)
            .map_err(at(Stage::Review))?;
        self.state
            .record_review(review.clone())
            .map_err(out_of_order(Stage::Review))?;
        self.complete(Stage::Review, Some(json!({ "reviewResult": review })));

        if review.has_improvements {
            self.begin(Stage::ApplyImprovements);
            let touched = implementer
                .apply_improvements(&working_copy, &change_set, &review.improvements_text())
                .map_err(at(Stage::ApplyImprovements))?;
            self.state
                .record_improvements_applied()
                .map_err(out_of_order(Stage::ApplyImprovements))?;
            self.complete(Stage::ApplyImprovements, Some(json!({ "files": touched })));
        }

        self.begin(Stage::Finalize);
        let message = format!("{task}\n\n{plan}");
        repository
            .commit(&working_copy, &message)
            .context("commit changes")
            .and_then(|()| {
                repository
                    .push(&working_copy, &branch_name)
                    .context("push branch")
            })
            .map_err(at(Stage::Finalize))?;
        self.state
            .record_finalized()
            .map_err(out_of_order(Stage::Finalize))?;
        self.complete(Stage::Finalize, Some(json!({ "branchName": branch_name })));

        self.begin(Stage::WritePullRequest);
        let content = PrWriter::new(generation, model(StageRole::PrWriter))
            .execute(task, &plan, &change_set, &review)
            .map_err(at(Stage::WritePullRequest))?;
        self.state
            .record_pull_request_content(content.clone())
            .map_err(out_of_order(Stage::WritePullRequest))?;
        self.complete(
            Stage::WritePullRequest,
            Some(json!({ "title": content.title })),
        );

        self.begin(Stage::OpenPullRequest);
        let pull_request = NewPullRequest {
            title: content.title,
            head: branch_name,
            base: base_branch.to_string(),
            body: content.body,
        };
        let pr = self
            .orchestrator
            .hosting
            .create_pull_request(&request.access_token, &self.repo, &pull_request)
            .map_err(at(Stage::OpenPullRequest))?;
        self.state
            .record_pull_request(pr.clone())
            .map_err(out_of_order(Stage::OpenPullRequest))?;
        Ok(pr)
    }

    fn begin(&mut self, stage: Stage) {
        info!(stage = %stage, "stage started");
        self.channel.emit(ProgressEvent::info(stage.start_message()));
    }

    fn complete(&mut self, stage: Stage, payload: Option<Value>) {
        info!(stage = %stage, phase = ?self.state.phase(), "stage completed");
        self.channel
            .emit(ProgressEvent::success(stage.success_message(), payload));
    }
}

fn at(stage: Stage) -> impl FnOnce(anyhow::Error) -> PipelineError {
    move |cause| PipelineError::at(stage, cause)
}

fn out_of_order(stage: Stage) -> impl FnOnce(StateError) -> PipelineError {
    move |cause| PipelineError::State { stage, cause }
}
