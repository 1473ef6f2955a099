use serde::{Deserialize, Serialize};

/// One block of structured prompt content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Code {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
        code: String,
    },
    /// Reference to a file the caller wants the model to look at.
    FileRef {
        path: String,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    /// True when the block carries no meaningful content.
    pub fn is_blank(&self) -> bool {
        match self {
            ContentBlock::Text { text } => text.trim().is_empty(),
            ContentBlock::Code { code, .. } => code.trim().is_empty(),
            ContentBlock::FileRef { path } => path.trim().is_empty(),
        }
    }
}

/// Plain text of the content, used as the user turn and the prompt title.
pub fn plain_text(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .filter_map(|b| match b {
            ContentBlock::Text { text } => Some(text.trim().to_string()),
            ContentBlock::Code { code, .. } => Some(code.trim_end().to_string()),
            ContentBlock::FileRef { path } => Some(format!("@{path}")),
        })
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// A file attached to the prompt as extra context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextFile {
    pub path: String,
    pub content: String,
}
