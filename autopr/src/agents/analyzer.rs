//! Codebase analyzer: bounded working-copy snapshot to a context summary.

use anyhow::{Context, Result};
use minijinja::context;
use tracing::{debug, instrument};

use crate::core::types::{RepoId, StageRole, WorkingCopy};
use crate::io::codebase::{SnapshotLimits, snapshot};
use crate::io::generation::GenerationClient;
use crate::io::prompt::Template;

use super::StageAgent;

const SYSTEM: &str = "You are a software architect reviewing an unfamiliar codebase. From the \
file listing and excerpts provided, describe the structure, conventions and the parts of the \
code that a developer must understand to complete the task. Be concrete and cite file paths.";

pub struct CodebaseAnalyzer<'a, G: ?Sized> {
    agent: StageAgent<'a, G>,
    limits: SnapshotLimits,
}

impl<'a, G: GenerationClient + ?Sized> CodebaseAnalyzer<'a, G> {
    pub fn new(client: &'a G, model: &'a str, limits: SnapshotLimits) -> Self {
        Self {
            agent: StageAgent::new(client, StageRole::Analyzer, model),
            limits,
        }
    }

    #[instrument(skip_all, fields(model = self.agent.model(), repo = %repo))]
    pub fn execute(&self, working_copy: &WorkingCopy, repo: &RepoId, task: &str) -> Result<String> {
        let snap = snapshot(working_copy.path(), task, self.limits)
            .context("collect codebase snapshot")?;
        debug!(files = snap.total_files, excerpts = snap.excerpts.len(), "analyzing snapshot");
        let text = self.agent.generate(
            Template::Analyzer,
            context! {
                task => task.trim(),
                repository => repo.to_string(),
                snapshot => snap.render(),
            },
            SYSTEM,
        )?;
        Ok(text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedGeneration;
    use std::fs;

    #[test]
    fn prompt_contains_listing_and_relevant_excerpt() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(temp.path().join("src")).expect("mkdir");
        fs::write(temp.path().join("src/login.rs"), "pub fn login() {}\n").expect("write");
        fs::write(temp.path().join("src/other.rs"), "pub fn other() {}\n").expect("write");

        let client = ScriptedGeneration::new().reply("analyzer", " Rust crate; see src/login.rs ");
        let summary = CodebaseAnalyzer::new(&client, "analyzer", SnapshotLimits::default())
            .execute(
                &WorkingCopy::new(temp.path()),
                &RepoId::new("octo", "app"),
                "Fix the login bug",
            )
            .expect("analyze");

        assert_eq!(summary, "Rust crate; see src/login.rs");
        let prompt = &client.calls()[0].prompt;
        assert!(prompt.contains("Repository: octo/app"));
        assert!(prompt.contains("- src/other.rs"));
        assert!(prompt.contains("### src/login.rs"));
        assert!(!prompt.contains("### src/other.rs"));
    }

    #[test]
    fn missing_working_copy_fails() {
        let client = ScriptedGeneration::new().reply("analyzer", "unused");
        let err = CodebaseAnalyzer::new(&client, "analyzer", SnapshotLimits::default())
            .execute(
                &WorkingCopy::new("/nonexistent/autopr-test"),
                &RepoId::new("octo", "app"),
                "t",
            )
            .unwrap_err();
        assert!(format!("{err:#}").contains("collect codebase snapshot"));
        assert!(client.calls().is_empty());
    }
}
