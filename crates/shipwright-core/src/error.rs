use serde::{Deserialize, Serialize};

/// Closed taxonomy of model-run failures.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    AuthError,
    Cancelled,
    Transient,
    Fatal,
    Unknown,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::AuthError => "auth-error",
            ErrorCode::Cancelled => "cancelled",
            ErrorCode::Transient => "transient",
            ErrorCode::Fatal => "fatal",
            ErrorCode::Unknown => "unknown",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCode::Transient | ErrorCode::Unknown)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized failure used for short-circuit decisions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedError {
    pub code: ErrorCode,
    pub message: String,
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_hint: Option<String>,
}
