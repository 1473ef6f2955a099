use regex::Regex;
use serde::{Deserialize, Serialize};
use shipwright_core::error::{ClassifiedError, ErrorCode};

use crate::agent::runner::RunnerFailure;
use crate::redact::{mask_secrets, truncate_chars};
use std::sync::OnceLock;

const MESSAGE_LIMIT: usize = 500;
const STDERR_LIMIT: usize = 2000;

const AUTH_PHRASES: &[&str] = &[
    "api key",
    "api_key",
    "unauthorized",
    "authentication",
    "invalid x-api-key",
    "forbidden",
];
const CANCEL_PHRASES: &[&str] = &["abort", "cancel", "interrupted"];
const TRANSIENT_PHRASES: &[&str] = &[
    "timeout",
    "timed out",
    "rate limit",
    "rate_limit",
    "overloaded",
    "connection reset",
    "connection refused",
    "temporarily unavailable",
    "econnreset",
];
const FATAL_PHRASES: &[&str] = &[
    "invalid request",
    "invalid_request",
    "context length",
    "prompt is too long",
    "not found",
    "spawning",
    "without result",
];

/// Diagnostics attached to a failed run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunDiagnostics {
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_run: Option<serde_json::Value>,
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// HTTP status codes, matched as whole words only.
fn auth_status() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b40[13]\b").ok()).as_ref()
}

fn transient_status() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(429|50[234]|529)\b").ok())
        .as_ref()
}

fn has_status(haystack: &str, re: Option<&Regex>) -> bool {
    re.is_some_and(|re| re.is_match(haystack))
}

/// Map a runner failure onto the closed error taxonomy.
///
/// An explicit cancellation (token fired or runner flag) wins over any
/// message text.
pub fn classify(failure: &RunnerFailure, cancel_requested: bool) -> ClassifiedError {
    let haystack = format!(
        "{} {}",
        failure.message,
        failure.stderr.as_deref().unwrap_or("")
    )
    .to_lowercase();

    let code = if cancel_requested || failure.cancelled {
        ErrorCode::Cancelled
    } else if contains_any(&haystack, AUTH_PHRASES) || has_status(&haystack, auth_status()) {
        ErrorCode::AuthError
    } else if contains_any(&haystack, CANCEL_PHRASES) {
        ErrorCode::Cancelled
    } else if contains_any(&haystack, TRANSIENT_PHRASES)
        || has_status(&haystack, transient_status())
    {
        ErrorCode::Transient
    } else if contains_any(&haystack, FATAL_PHRASES) {
        ErrorCode::Fatal
    } else {
        ErrorCode::Unknown
    };

    let retry_hint = match code {
        ErrorCode::AuthError => Some("check the model credential and retry".to_string()),
        ErrorCode::Transient => Some("retry after a short delay".to_string()),
        ErrorCode::Unknown => Some("retry once; report if it persists".to_string()),
        ErrorCode::Cancelled | ErrorCode::Fatal => None,
    };

    ClassifiedError {
        code,
        message: truncate_chars(&mask_secrets(failure.message.trim()), MESSAGE_LIMIT),
        retryable: code.is_retryable(),
        retry_hint,
    }
}

pub fn run_diagnostics(
    failure: &RunnerFailure,
    duration_ms: u64,
    pre_run: Option<serde_json::Value>,
) -> RunDiagnostics {
    RunDiagnostics {
        duration_ms,
        stderr: failure
            .stderr
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(|s| truncate_chars(&mask_secrets(s), STDERR_LIMIT)),
        exit_code: failure.exit_code,
        pre_run,
    }
}
