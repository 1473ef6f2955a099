use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Nested agent context carried by a session and refined per call.
///
/// Named fields cover what the pipeline reads directly; anything else the
/// caller sends lands in `extra` and is passed through untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentContext {
    /// `"owner/name"`, a repository URL, or an object with owner/name fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installation_id: Option<Value>,
    /// Automation intent hints. Merged key by key across turns.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub automation: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AgentContext {
    /// Installation identifier rendered as text (callers send numbers or strings).
    pub fn installation_id_text(&self) -> Option<String> {
        match self.installation_id.as_ref()? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_keys_land_in_extra() {
        let json = r#"{"repository":"acme/widgets","automation":{"mode":"full"},"ticket":"T-1"}"#;
        let ctx: AgentContext = serde_json::from_str(json).unwrap();
        assert_eq!(ctx.repository, Some(Value::String("acme/widgets".into())));
        assert_eq!(ctx.automation["mode"], "full");
        assert_eq!(ctx.extra["ticket"], "T-1");
    }

    #[test]
    fn installation_id_accepts_numbers() {
        let ctx: AgentContext = serde_json::from_str(r#"{"installationId":4242}"#).unwrap();
        assert_eq!(ctx.installation_id_text().as_deref(), Some("4242"));
    }

    #[test]
    fn empty_context_serializes_to_empty_object() {
        let json = serde_json::to_string(&AgentContext::default()).unwrap();
        assert_eq!(json, "{}");
    }
}
