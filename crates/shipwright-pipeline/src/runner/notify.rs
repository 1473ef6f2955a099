use serde::{Deserialize, Serialize};

/// Coarse status reported to progress consumers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Queued,
    Working,
    Completed,
    Failed,
}

/// One progress notification for an operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub operation_id: String,
    pub status: ProgressStatus,
    /// Cumulative output text so far.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// 0-100.
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Receives progress events. Called from runner callbacks, so it must not
/// block on I/O.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Logs events through `tracing`.
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn emit(&self, event: ProgressEvent) {
        tracing::debug!(
            operation_id = %event.operation_id,
            status = ?event.status,
            progress = event.progress,
            message = event.message.as_deref().unwrap_or(""),
            "progress"
        );
    }
}

/// Drops every event.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Collects events in memory (for testing).
#[derive(Default)]
pub struct CollectSink {
    events: std::sync::Mutex<Vec<ProgressEvent>>,
}

impl CollectSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<ProgressStatus> {
        self.events().into_iter().map(|e| e.status).collect()
    }
}

impl ProgressSink for CollectSink {
    fn emit(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}
