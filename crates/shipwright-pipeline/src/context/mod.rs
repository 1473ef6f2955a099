pub mod merge;
pub mod prompt;

pub use merge::merge_context;
pub use prompt::{build_prompt, estimate_tokens, BuiltPrompt};
