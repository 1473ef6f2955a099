//! Prompt processing and change-automation pipeline.
//!
//! One call to [`Pipeline::process_prompt`] prepares a workspace, runs the
//! model with streaming progress, applies optional patches, snapshots the
//! resulting git changes and, when permitted, hands them to an automation
//! provider that publishes a branch, commit and pull request.

pub mod agent;
pub mod automation;
pub mod clock;
pub mod config;
pub mod context;
pub mod credential;
pub mod diagnostics;
pub mod error;
pub mod git;
pub mod redact;
pub mod runner;
pub mod session;
pub mod state;
pub mod workspace;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use runner::compose::PromptResult;
pub use runner::pipeline::{Pipeline, ProcessPromptOptions};
