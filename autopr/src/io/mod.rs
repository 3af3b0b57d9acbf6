//! Side-effecting adapters: processes, git, HTTP backends, config and the
//! working-copy filesystem.

pub mod codebase;
pub mod config;
pub mod edits;
pub mod generation;
pub mod git;
pub mod github;
pub mod process;
pub mod prompt;
