use serde::{Deserialize, Serialize};

/// Operation ID format: `op_<ulid>`
pub type OperationId = String;

/// Session ID as supplied by the caller.
pub type SessionId = String;

/// Generate a new operation ID.
pub fn new_operation_id() -> OperationId {
    format!("op_{}", ulid::Ulid::new().to_string().to_lowercase())
}

/// Format a timestamp as RFC 3339. Falls back to the unix epoch string on
/// formatting failure, which only happens for out-of-range years.
pub fn format_rfc3339(ts: time::OffsetDateTime) -> String {
    ts.format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Pipeline-level outcome of a prompt call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Completed,
    Cancelled,
    Error,
}

/// Token usage of a model run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input + self.output
    }
}

/// A tool invocation reported by the model runner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolUseRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub input: serde_json::Value,
}

impl ToolUseRecord {
    /// File path targeted by a write-style tool, if any.
    pub fn target_path(&self) -> Option<&str> {
        self.input
            .get("file_path")
            .or_else(|| self.input.get("path"))
            .and_then(|v| v.as_str())
    }
}

/// Cost information reported by the runner.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CostData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Accumulated outcome of one model run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub text: String,
    pub usage: TokenUsage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_use: Vec<ToolUseRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<CostData>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_id_format() {
        let id = new_operation_id();
        assert!(id.starts_with("op_"));
        assert_eq!(id.len(), 3 + 26);
        assert_ne!(id, new_operation_id());
    }

    #[test]
    fn stop_reason_serializes_snake_case() {
        let json = serde_json::to_string(&StopReason::Cancelled).unwrap();
        assert_eq!(json, r#""cancelled""#);
    }

    #[test]
    fn tool_use_target_path() {
        let rec = ToolUseRecord {
            id: None,
            name: "Write".into(),
            input: serde_json::json!({"file_path": "src/lib.rs", "content": "x"}),
        };
        assert_eq!(rec.target_path(), Some("src/lib.rs"));
    }

    #[test]
    fn format_epoch() {
        let s = format_rfc3339(time::OffsetDateTime::UNIX_EPOCH);
        assert_eq!(s, "1970-01-01T00:00:00Z");
    }
}
