pub mod classify;
pub mod claude;
pub mod commit_message;
pub mod executor;
pub mod runner;
pub mod stream;

pub use runner::{ModelRunner, RunObserver, RunOptions, RunnerFailure, RunnerOutput};
