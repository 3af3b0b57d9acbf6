//! Stage agents.
//!
//! Each agent is one call to the [`GenerationClient`] with a fixed system
//! instruction and a role-specific prompt, followed by deterministic
//! post-processing. Agents hold no state between calls; a generation failure
//! surfaces as an error and never as substitute content.

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::debug;

use crate::core::types::StageRole;
use crate::io::generation::GenerationClient;
use crate::io::prompt::{PromptEngine, Template};

pub mod analyzer;
pub mod branch_namer;
pub mod implementer;
pub mod planner;
pub mod pr_writer;
pub mod reviewer;

pub use analyzer::CodebaseAnalyzer;
pub use branch_namer::BranchNamer;
pub use implementer::Implementer;
pub use planner::Planner;
pub use pr_writer::PrWriter;
pub use reviewer::Reviewer;

/// A generation client bound to one role and model.
pub struct StageAgent<'a, G: ?Sized> {
    client: &'a G,
    role: StageRole,
    model: &'a str,
}

impl<'a, G: GenerationClient + ?Sized> StageAgent<'a, G> {
    pub fn new(client: &'a G, role: StageRole, model: &'a str) -> Self {
        Self {
            client,
            role,
            model,
        }
    }

    pub fn role(&self) -> StageRole {
        self.role
    }

    pub fn model(&self) -> &str {
        self.model
    }

    /// Render `template` with `ctx` and run one generation under `system`.
    ///
    /// Blank responses are errors.
    pub(crate) fn generate<C: Serialize>(
        &self,
        template: Template,
        ctx: C,
        system: &str,
    ) -> Result<String> {
        let prompt = PromptEngine::global().render(template, ctx)?;
        let text = self
            .client
            .generate(self.model, &prompt, system)
            .with_context(|| format!("generate with model '{}'", self.model))?;
        if text.trim().is_empty() {
            bail!("model '{}' returned an empty response", self.model);
        }
        debug!(role = %self.role, model = self.model, bytes = text.len(), "stage generation finished");
        Ok(text)
    }
}

/// At most `max_chars` characters of `text`, and whether anything was cut.
pub(crate) fn char_prefix(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => (&text[..idx], true),
        None => (text, false),
    }
}
