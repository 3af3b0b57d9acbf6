//! PR writer: title and body for the pull request.

use anyhow::Result;
use minijinja::context;
use tracing::instrument;

use crate::core::response::parse_pull_request;
use crate::core::types::{ChangeSet, PullRequestContent, ReviewResult, StageRole};
use crate::io::generation::GenerationClient;
use crate::io::prompt::Template;

use super::StageAgent;

const SYSTEM: &str = "You write clear, professional pull request descriptions. Use a short \
imperative title and a markdown body that explains what changed, why, and how it was reviewed.";

pub struct PrWriter<'a, G: ?Sized> {
    agent: StageAgent<'a, G>,
}

impl<'a, G: GenerationClient + ?Sized> PrWriter<'a, G> {
    pub fn new(client: &'a G, model: &'a str) -> Self {
        Self {
            agent: StageAgent::new(client, StageRole::PrWriter, model),
        }
    }

    #[instrument(skip_all, fields(model = self.agent.model()))]
    pub fn execute(
        &self,
        task: &str,
        plan: &str,
        change_set: &ChangeSet,
        review: &ReviewResult,
    ) -> Result<PullRequestContent> {
        let text = self.agent.generate(
            Template::PrWriter,
            context! {
                task => task.trim(),
                plan => plan,
                summary => &change_set.summary,
                file_list => change_set.file_list(),
                review => review_notes(review),
            },
            SYSTEM,
        )?;
        parse_pull_request(&text)
    }
}

fn review_notes(review: &ReviewResult) -> String {
    let mut notes = if review.summary.is_empty() {
        String::from("Reviewed.")
    } else {
        review.summary.clone()
    };
    if review.has_improvements {
        notes.push_str("\n\nImprovements applied after review:\n");
        notes.push_str(&review.improvements_text());
    } else {
        notes.push_str("\n\nNo improvements were requested.");
    }
    notes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ChangeAction, FileChange};
    use crate::test_support::ScriptedGeneration;

    fn change_set() -> ChangeSet {
        ChangeSet {
            summary: "Add health endpoint".into(),
            files: vec![FileChange {
                path: "src/health.rs".into(),
                action: ChangeAction::Created,
            }],
        }
    }

    #[test]
    fn parses_json_pull_request() {
        let client = ScriptedGeneration::new()
            .reply("pr", r#"{"title": "Add health endpoint", "body": "Adds `/health`."}"#);
        let review = ReviewResult {
            has_improvements: true,
            summary: "Fine".into(),
            improvements: vec!["Add docs".into()],
        };
        let content = PrWriter::new(&client, "pr")
            .execute("Add health", "1. Add", &change_set(), &review)
            .expect("write");
        assert_eq!(content.title, "Add health endpoint");
        assert_eq!(content.body, "Adds `/health`.");

        let prompt = &client.calls()[0].prompt;
        assert!(prompt.contains("- src/health.rs (created)"));
        assert!(prompt.contains("Improvements applied after review:\n1. Add docs"));
    }

    #[test]
    fn falls_back_to_markdown() {
        let client = ScriptedGeneration::new().reply("pr", "# Title: Add health\n\nBody text");
        let review = ReviewResult {
            has_improvements: false,
            summary: String::new(),
            improvements: Vec::new(),
        };
        let content = PrWriter::new(&client, "pr")
            .execute("t", "p", &change_set(), &review)
            .expect("write");
        assert_eq!(content.title, "Add health");
        assert_eq!(content.body, "Body text");
    }
}
