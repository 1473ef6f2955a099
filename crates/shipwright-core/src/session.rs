use serde::{Deserialize, Serialize};

use crate::context::AgentContext;
use crate::types::ToolUseRecord;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Chat,
    #[default]
    Agent,
    Review,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionMode::Chat => "chat",
            SessionMode::Agent => "agent",
            SessionMode::Review => "review",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Active,
    Idle,
    Closed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_use: Vec<ToolUseRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Message {
    pub fn user(content: impl Into<String>, created_at: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            created_at: created_at.into(),
            tool_use: Vec::new(),
            metadata: None,
        }
    }

    pub fn assistant(content: impl Into<String>, created_at: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            created_at: created_at.into(),
            tool_use: Vec::new(),
            metadata: None,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionOptions {
    #[serde(default = "default_true")]
    pub persist_history: bool,
    /// `Some(false)` disables automation for every turn of this session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_automation: Option<bool>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            persist_history: true,
            enable_automation: None,
        }
    }
}

/// Stateful conversation scoped to one working codebase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_uri: Option<String>,
    #[serde(default)]
    pub mode: SessionMode,
    #[serde(default)]
    pub state: SessionState,
    /// Append-only.
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub options: SessionOptions,
    #[serde(default)]
    pub agent_context: AgentContext,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            workspace_uri: None,
            mode: SessionMode::default(),
            state: SessionState::default(),
            messages: Vec::new(),
            options: SessionOptions::default(),
            agent_context: AgentContext::default(),
        }
    }

    /// Append a user/assistant pair in order.
    pub fn append_turn(&mut self, user: Message, assistant: Message) {
        self.messages.push(user);
        self.messages.push(assistant);
    }

    /// True when automation is explicitly switched off for this session.
    pub fn automation_disabled(&self) -> bool {
        self.options.enable_automation == Some(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_session_json() {
        let s: Session = serde_json::from_str(r#"{"id":"s1"}"#).unwrap();
        assert_eq!(s.id, "s1");
        assert_eq!(s.mode, SessionMode::Agent);
        assert!(s.options.persist_history);
        assert!(!s.automation_disabled());
        assert!(s.messages.is_empty());
    }

    #[test]
    fn append_turn_keeps_order() {
        let mut s = Session::new("s1");
        s.append_turn(Message::user("q", "t0"), Message::assistant("a", "t1"));
        assert_eq!(s.messages.len(), 2);
        assert_eq!(s.messages[0].role, Role::User);
        assert_eq!(s.messages[1].role, Role::Assistant);
    }

    #[test]
    fn explicit_disable() {
        let s: Session =
            serde_json::from_str(r#"{"id":"s1","options":{"enableAutomation":false}}"#).unwrap();
        assert!(s.automation_disabled());
    }
}
