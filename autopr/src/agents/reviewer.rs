//! Reviewer: inspects the written change and asks for improvements.

use anyhow::Result;
use minijinja::context;
use serde::Serialize;
use tracing::{info, instrument};

use crate::core::response::{NO_IMPROVEMENTS, parse_review};
use crate::core::types::{ChangeAction, ChangeSet, ReviewResult, StageRole, WorkingCopy};
use crate::io::codebase::read_excerpt;
use crate::io::generation::GenerationClient;
use crate::io::prompt::Template;

use super::StageAgent;

#[derive(Serialize)]
struct ReviewedFile<'a> {
    path: &'a str,
    action: ChangeAction,
    content: String,
    truncated: bool,
}

pub struct Reviewer<'a, G: ?Sized> {
    agent: StageAgent<'a, G>,
    max_file_bytes: usize,
}

impl<'a, G: GenerationClient + ?Sized> Reviewer<'a, G> {
    pub fn new(client: &'a G, model: &'a str, max_file_bytes: usize) -> Self {
        Self {
            agent: StageAgent::new(client, StageRole::Reviewer, model),
            max_file_bytes,
        }
    }

    #[instrument(skip_all, fields(model = self.agent.model()))]
    pub fn execute(
        &self,
        working_copy: &WorkingCopy,
        change_set: &ChangeSet,
        task: &str,
    ) -> Result<ReviewResult> {
        let mut files = Vec::with_capacity(change_set.files.len());
        for change in &change_set.files {
            let excerpt = read_excerpt(working_copy.path(), &change.path, self.max_file_bytes)?;
            let (content, truncated) = match excerpt {
                Some(excerpt) => (excerpt.content, excerpt.truncated),
                None => ("(not readable as text)".to_string(), false),
            };
            files.push(ReviewedFile {
                path: &change.path,
                action: change.action,
                content,
                truncated,
            });
        }
        let system = format!(
            "You are a meticulous code reviewer. Check the change for bugs, missing pieces and \
             code quality problems. If the change is ready, return an empty improvements list \
             (or reply {NO_IMPROVEMENTS} when not answering in JSON)."
        );
        let text = self.agent.generate(
            Template::Reviewer,
            context! { task => task.trim(), summary => &change_set.summary, files => files },
            &system,
        )?;
        let review = parse_review(&text)?;
        info!(
            has_improvements = review.has_improvements,
            improvements = review.improvements.len(),
            "review finished"
        );
        Ok(review)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::FileChange;
    use crate::test_support::ScriptedGeneration;
    use std::fs;

    fn setup() -> (tempfile::TempDir, ChangeSet) {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("health.rs"), "pub fn ok() {}\n").expect("write");
        let change_set = ChangeSet {
            summary: "Add health".into(),
            files: vec![FileChange {
                path: "health.rs".into(),
                action: ChangeAction::Created,
            }],
        };
        (temp, change_set)
    }

    #[test]
    fn shows_changed_files_and_parses_improvements() {
        let (temp, change_set) = setup();
        let client = ScriptedGeneration::new().reply(
            "rev",
            r#"{"approved": false, "summary": "Needs docs", "improvements": ["Document ok()"]}"#,
        );
        let review = Reviewer::new(&client, "rev", 1000)
            .execute(&WorkingCopy::new(temp.path()), &change_set, "Add health")
            .expect("review");

        assert!(review.has_improvements);
        assert_eq!(review.improvements, vec!["Document ok()".to_string()]);
        let prompt = &client.calls()[0].prompt;
        assert!(prompt.contains("### health.rs (created)"));
        assert!(prompt.contains("pub fn ok() {}"));
    }

    #[test]
    fn sentinel_means_no_improvements() {
        let (temp, change_set) = setup();
        let client = ScriptedGeneration::new().reply("rev", "Looks good. NO_IMPROVEMENTS");
        let review = Reviewer::new(&client, "rev", 1000)
            .execute(&WorkingCopy::new(temp.path()), &change_set, "Add health")
            .expect("review");
        assert!(!review.has_improvements);
        assert_eq!(review.summary, "Looks good.");
    }
}
