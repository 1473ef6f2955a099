/// Failures that reject a call before any side effect.
///
/// Everything after validation is absorbed into the returned
/// [`PromptResult`](crate::PromptResult) instead.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("session id is required")]
    MissingSessionId,

    #[error("prompt content is empty")]
    EmptyContent,

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("loading session {id}: {message}")]
    SessionLoad { id: String, message: String },
}

pub type Result<T> = std::result::Result<T, PipelineError>;
