//! Implementer: writes the change into the working copy.
//!
//! The model answers with a JSON edit set of whole-file writes. The first
//! pass produces the run's [`ChangeSet`]; the improvement pass edits the
//! working copy again without replacing it.

use anyhow::{Context, Result, bail};
use minijinja::context;
use serde::Serialize;
use tracing::{info, instrument};

use crate::core::response::parse_edit_set;
use crate::core::types::{ChangeSet, FileChange, StageRole, WorkingCopy};
use crate::io::codebase::read_excerpt;
use crate::io::edits::apply_edits;
use crate::io::generation::GenerationClient;
use crate::io::prompt::Template;

use super::StageAgent;

const SYSTEM: &str = "You are an expert software developer. You implement changes by writing \
complete file contents. Follow the existing conventions of the codebase, keep changes focused \
on the task, and never include explanations outside the requested JSON.";

/// Summary recorded when the model leaves it blank.
const DEFAULT_SUMMARY: &str = "Implemented the requested change.";

#[derive(Serialize)]
struct CurrentFile {
    path: String,
    content: String,
}

pub struct Implementer<'a, G: ?Sized> {
    agent: StageAgent<'a, G>,
    max_file_bytes: usize,
}

impl<'a, G: GenerationClient + ?Sized> Implementer<'a, G> {
    /// `max_file_bytes` bounds each current file shown in the improvement pass.
    pub fn new(client: &'a G, model: &'a str, max_file_bytes: usize) -> Self {
        Self {
            agent: StageAgent::new(client, StageRole::Implementer, model),
            max_file_bytes,
        }
    }

    #[instrument(skip_all, fields(model = self.agent.model()))]
    pub fn execute(
        &self,
        working_copy: &WorkingCopy,
        task: &str,
        plan: &str,
        codebase_context: &str,
    ) -> Result<ChangeSet> {
        let text = self.agent.generate(
            Template::Implementer,
            context! { task => task.trim(), plan => plan, context => codebase_context },
            SYSTEM,
        )?;
        let edits = parse_edit_set(&text)?;
        if edits.files.is_empty() {
            bail!("implementer response contained no file edits");
        }
        let files = apply_edits(working_copy.path(), &edits.files).context("apply edits")?;
        info!(files = files.len(), "implementation written");
        let summary = edits.summary.trim();
        Ok(ChangeSet {
            summary: if summary.is_empty() {
                DEFAULT_SUMMARY.to_string()
            } else {
                summary.to_string()
            },
            files,
        })
    }

    /// Apply reviewer improvements on top of `change_set`.
    ///
    /// Returns the files touched by this pass, which may be none.
    #[instrument(skip_all, fields(model = self.agent.model()))]
    pub fn apply_improvements(
        &self,
        working_copy: &WorkingCopy,
        change_set: &ChangeSet,
        improvements: &str,
    ) -> Result<Vec<FileChange>> {
        let mut files = Vec::new();
        for change in &change_set.files {
            if let Some(excerpt) = read_excerpt(working_copy.path(), &change.path, self.max_file_bytes)? {
                files.push(CurrentFile {
                    path: excerpt.path,
                    content: excerpt.content,
                });
            }
        }
        let text = self.agent.generate(
            Template::Improvements,
            context! { improvements => improvements, files => files },
            SYSTEM,
        )?;
        let edits = parse_edit_set(&text)?;
        let touched = apply_edits(working_copy.path(), &edits.files).context("apply improvements")?;
        info!(files = touched.len(), "improvements written");
        Ok(touched)
    }
}
