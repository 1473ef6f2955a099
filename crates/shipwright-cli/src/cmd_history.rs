use anyhow::Result;
use shipwright_core::session::{Message, Role};
use std::path::Path;

fn role_label(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "system",
    }
}

fn render(messages: &[Message], limit: Option<usize>) -> String {
    let skip = limit.map_or(0, |n| messages.len().saturating_sub(n));
    let mut out = String::new();
    for m in &messages[skip..] {
        out.push_str(&format!("[{}] {}\n", m.created_at, role_label(m.role)));
        for line in m.content.lines() {
            out.push_str("  ");
            out.push_str(line);
            out.push('\n');
        }
        if !m.tool_use.is_empty() {
            let names: Vec<&str> = m.tool_use.iter().map(|t| t.name.as_str()).collect();
            out.push_str(&format!("  (tools: {})\n", names.join(", ")));
        }
    }
    out
}

/// Execute `shipwright history <session>`.
pub fn run(root: &Path, session_id: &str, limit: Option<usize>, json: bool) -> Result<()> {
    let Some(session) = shipwright_store::load_session(root, session_id)? else {
        anyhow::bail!("no session named '{session_id}'");
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&session.messages)?);
    } else if session.messages.is_empty() {
        println!("(no messages)");
    } else {
        print!("{}", render(&session.messages, limit));
    }
    Ok(())
}
