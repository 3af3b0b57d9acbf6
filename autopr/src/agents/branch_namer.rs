//! Branch namer: task and plan summary to a normalized `category/slug`.

use anyhow::Result;
use minijinja::context;
use tracing::{debug, instrument};

use crate::core::branch::{BRANCH_NAME_GUIDELINE_LEN, normalize_branch_name};
use crate::core::types::StageRole;
use crate::io::generation::GenerationClient;
use crate::io::prompt::Template;

use super::{StageAgent, char_prefix};

/// Characters of the plan shown to the model.
pub const PLAN_PREFIX_CHARS: usize = 500;

const SYSTEM: &str = "You create concise, descriptive git branch names.

Conventions:
- lowercase letters, digits and hyphens only
- a category prefix such as feature/, fix/, refactor/ or docs/
- descriptive but short (at most 50 characters)

Examples:
- feature/add-user-authentication
- fix/resolve-payment-bug
- refactor/optimize-database-queries
- docs/update-api-documentation

Return ONLY the branch name, nothing else.";

pub struct BranchNamer<'a, G: ?Sized> {
    agent: StageAgent<'a, G>,
}

impl<'a, G: GenerationClient + ?Sized> BranchNamer<'a, G> {
    pub fn new(client: &'a G, model: &'a str) -> Self {
        Self {
            agent: StageAgent::new(client, StageRole::BranchNamer, model),
        }
    }

    #[instrument(skip_all, fields(model = self.agent.model()))]
    pub fn execute(&self, task: &str, plan: &str) -> Result<String> {
        let (plan_summary, plan_truncated) = char_prefix(plan, PLAN_PREFIX_CHARS);
        let raw = self.agent.generate(
            Template::BranchNamer,
            context! {
                task => task.trim(),
                plan_summary => plan_summary,
                plan_truncated => plan_truncated,
                max_len => BRANCH_NAME_GUIDELINE_LEN,
            },
            SYSTEM,
        )?;
        let name = normalize_branch_name(&raw)?;
        debug!(raw = raw.trim(), %name, "normalized branch name");
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedGeneration;

    #[test]
    fn normalizes_generated_name() {
        let client = ScriptedGeneration::new().reply("namer", "Branch name: `Fix the Login Bug!!`\n");
        let name = BranchNamer::new(&client, "namer")
            .execute("Fix login", "1. Fix it")
            .expect("name");
        assert_eq!(name, "feature/fix-the-login-bug");
    }

    #[test]
    fn shows_only_a_plan_prefix() {
        let client = ScriptedGeneration::new().reply("namer", "fix/long-plan");
        let plan = "x".repeat(PLAN_PREFIX_CHARS + 100);
        BranchNamer::new(&client, "namer")
            .execute("t", &plan)
            .expect("name");
        let prompt = &client.calls()[0].prompt;
        let shown = format!("Plan summary: {}...", "x".repeat(PLAN_PREFIX_CHARS));
        assert!(prompt.contains(&shown));
        assert!(!prompt.contains(&"x".repeat(PLAN_PREFIX_CHARS + 1)));
    }

    #[test]
    fn unusable_text_fails_the_stage() {
        let client = ScriptedGeneration::new().reply("namer", "!!!");
        let err = BranchNamer::new(&client, "namer").execute("t", "p").unwrap_err();
        assert!(err.to_string().contains("no usable characters"), "{err}");
    }
}
