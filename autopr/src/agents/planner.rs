//! Planner: task description to a numbered implementation plan.

use anyhow::Result;
use minijinja::context;
use tracing::instrument;

use crate::core::types::StageRole;
use crate::io::generation::GenerationClient;
use crate::io::prompt::Template;

use super::StageAgent;

const SYSTEM: &str = "You are a senior software engineer who breaks coding tasks down into clear, \
actionable steps. Analyze the task, consider technical dependencies, and return a structured plan \
with numbered steps. Be specific about what needs to be done in each step.";

pub struct Planner<'a, G: ?Sized> {
    agent: StageAgent<'a, G>,
}

impl<'a, G: GenerationClient + ?Sized> Planner<'a, G> {
    pub fn new(client: &'a G, model: &'a str) -> Self {
        Self {
            agent: StageAgent::new(client, StageRole::Planner, model),
        }
    }

    /// The generated plan, trimmed.
    #[instrument(skip_all, fields(model = self.agent.model()))]
    pub fn execute(&self, task: &str) -> Result<String> {
        let text = self
            .agent
            .generate(Template::Planner, context! { task => task.trim() }, SYSTEM)?;
        Ok(text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedGeneration;

    #[test]
    fn returns_trimmed_plan() {
        let client = ScriptedGeneration::new().reply("planner", "\n1. Add route\n2. Test it\n\n");
        let plan = Planner::new(&client, "planner")
            .execute("Add a health endpoint")
            .expect("plan");
        assert_eq!(plan, "1. Add route\n2. Test it");
        assert!(client.calls()[0].prompt.contains("Task: Add a health endpoint"));
    }

    #[test]
    fn generation_failure_has_no_fallback() {
        let client = ScriptedGeneration::new().fail("planner", "connection refused");
        let err = Planner::new(&client, "planner").execute("x").unwrap_err();
        assert!(format!("{err:#}").contains("connection refused"));
    }
}
