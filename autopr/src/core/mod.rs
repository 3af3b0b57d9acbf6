//! Deterministic, pure logic shared by the orchestrator.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod branch;
pub mod error;
pub mod paths;
pub mod request;
pub mod response;
pub mod stage;
pub mod state;
pub mod types;
