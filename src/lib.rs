//! Finds pull requests across a GitHub organization that cannot merge
//! and mends them: sync with base, bounded content fixes, safe publish.

pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod model;
pub mod orchestrator;
pub mod remediate;
pub mod scanner;
pub mod shutdown;
pub mod workspace;
