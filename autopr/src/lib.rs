//! LLM-driven task-to-pull-request pipeline.
//!
//! One run takes a natural-language task, plans it, names a branch, clones
//! the repository, writes and reviews the change, pushes it and opens a pull
//! request, streaming progress events as it goes. The crate keeps a strict
//! separation:
//!
//! - **[`core`]**: Pure, deterministic logic (request validation, branch-name
//!   normalization, response parsing, the run state machine). No I/O.
//! - **[`io`]**: Side-effecting adapters (git, HTTP backends, config, the
//!   working-copy filesystem). Behind traits so tests can script them.
//! - **[`agents`]**: The six stage agents, one generation call each.
//!
//! [`pipeline`] sequences agents and adapters for one run and reports through
//! [`progress`].

pub mod agents;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod progress;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
