use serde_json::Value;
use shipwright_core::content::{ContentBlock, ContextFile};
use shipwright_core::context::AgentContext;
use shipwright_core::session::{Session, SessionMode};

/// Prompt text plus a rough input-token estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltPrompt {
    pub text: String,
    pub estimated_input_tokens: u64,
}

/// About four characters per token.
pub fn estimate_tokens(text: &str) -> u64 {
    text.chars().count().div_ceil(4) as u64
}

fn repository_hint(repository: &Value) -> Option<String> {
    match repository {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Object(obj) => {
            let get = |k: &str| obj.get(k).and_then(Value::as_str);
            get("fullName")
                .map(String::from)
                .or_else(|| {
                    let owner = get("owner").or_else(|| {
                        obj.get("owner")
                            .and_then(|o| o.get("login"))
                            .and_then(Value::as_str)
                    })?;
                    Some(format!("{owner}/{}", get("name")?))
                })
                .or_else(|| get("url").map(String::from))
        }
        _ => None,
    }
}

fn mode_instruction(mode: SessionMode) -> Option<&'static str> {
    match mode {
        SessionMode::Agent => None,
        SessionMode::Chat => Some("Answer conversationally. Do not modify files."),
        SessionMode::Review => {
            Some("Review the code in question and report findings. Do not modify files.")
        }
    }
}

/// Assemble the model prompt from content, attached files and context.
///
/// Conversation history is not inlined; runners receive it separately.
pub fn build_prompt(
    blocks: &[ContentBlock],
    context_files: &[ContextFile],
    context: &AgentContext,
    session: &Session,
) -> BuiltPrompt {
    let mut sections: Vec<String> = Vec::new();

    if let Some(instruction) = mode_instruction(session.mode) {
        sections.push(instruction.to_string());
    }

    let mut hints = Vec::new();
    if let Some(repo) = context.repository.as_ref().and_then(repository_hint) {
        hints.push(format!("Repository: {repo}"));
    }
    if let Some(branch) = context.branch.as_deref() {
        hints.push(format!("Branch: {branch}"));
    }
    if let Some(base) = context.base_branch.as_deref() {
        hints.push(format!("Base branch: {base}"));
    }
    if !hints.is_empty() {
        sections.push(hints.join("\n"));
    }

    for file in context_files {
        sections.push(format!(
            "File: {}\n```\n{}\n```",
            file.path,
            file.content.trim_end()
        ));
    }

    let request: Vec<String> = blocks
        .iter()
        .filter(|b| !b.is_blank())
        .map(|b| match b {
            ContentBlock::Text { text } => text.trim().to_string(),
            ContentBlock::Code {
                language,
                path,
                code,
            } => {
                let info = match (language.as_deref(), path.as_deref()) {
                    (Some(l), Some(p)) => format!("{l} path={p}"),
                    (Some(l), None) => l.to_string(),
                    (None, Some(p)) => format!("path={p}"),
                    (None, None) => String::new(),
                };
                format!("```{info}\n{}\n```", code.trim_end())
            }
            ContentBlock::FileRef { path } => format!("See file: {path}"),
        })
        .collect();
    sections.push(request.join("\n\n"));

    let text = sections.join("\n\n");
    BuiltPrompt {
        estimated_input_tokens: estimate_tokens(&text),
        text,
    }
}
