use std::path::{Component, Path};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::git::GitService;
use crate::redact::{mask_secrets, truncate_chars};

/// A fenced code block from model output.
#[derive(Debug, Clone, PartialEq)]
pub struct FencedBlock {
    pub info: String,
    pub body: String,
}

/// Fenced (```) blocks in order. An unterminated block runs to the end.
pub fn fenced_blocks(text: &str) -> Vec<FencedBlock> {
    let mut blocks = Vec::new();
    let mut current: Option<(String, Vec<&str>)> = None;
    for line in text.lines() {
        let trimmed = line.trim_start();
        match current.take() {
            None => {
                if let Some(info) = trimmed.strip_prefix("```") {
                    current = Some((info.trim().to_string(), Vec::new()));
                }
            }
            Some((info, mut body)) => {
                if trimmed.trim_end() == "```" {
                    blocks.push(FencedBlock {
                        info,
                        body: join_lines(&body),
                    });
                } else {
                    body.push(line);
                    current = Some((info, body));
                }
            }
        }
    }
    if let Some((info, body)) = current {
        blocks.push(FencedBlock {
            info,
            body: join_lines(&body),
        });
    }
    blocks
}

fn join_lines(lines: &[&str]) -> String {
    let mut s = lines.join("\n");
    s.push('\n');
    s
}

fn looks_like_diff(body: &str) -> bool {
    let has = |prefix: &str| body.lines().any(|l| l.starts_with(prefix));
    has("diff --git ") || (has("--- ") && has("+++ ") && has("@@"))
}

const DIFF_LINE_PREFIXES: &[&str] = &[
    " ", "+", "-", "@@", "\\", "diff ", "index ", "new file", "deleted file", "similarity",
    "rename ", "old mode", "new mode", "Binary",
];

/// Unified-diff blocks in model output.
///
/// Fenced blocks tagged `diff`/`patch`, or whose body reads as a diff, win.
/// Without any, bare `diff --git` sections in the text are used.
pub fn extract_patches(text: &str) -> Vec<String> {
    let fenced: Vec<String> = fenced_blocks(text)
        .into_iter()
        .filter(|b| {
            let lang = b.info.split_whitespace().next().unwrap_or("");
            matches!(lang, "diff" | "patch") || looks_like_diff(&b.body)
        })
        .map(|b| b.body)
        .filter(|b| !b.trim().is_empty())
        .collect();
    if !fenced.is_empty() {
        return fenced;
    }

    let mut patches = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.starts_with("diff --git ") {
            flush(&mut current, &mut patches);
            current.push(line);
        } else if !current.is_empty() {
            if line.is_empty() || DIFF_LINE_PREFIXES.iter().any(|p| line.starts_with(p)) {
                current.push(line);
            } else {
                flush(&mut current, &mut patches);
            }
        }
    }
    flush(&mut current, &mut patches);
    patches
}

fn flush(current: &mut Vec<&str>, patches: &mut Vec<String>) {
    while current.last().is_some_and(|l| l.trim().is_empty()) {
        current.pop();
    }
    if !current.is_empty() {
        patches.push(join_lines(current));
    }
    current.clear();
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatchFailure {
    pub index: usize,
    pub error: String,
}

/// Outcome of applying every patch found in a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PatchReport {
    pub found: usize,
    pub applied: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<PatchFailure>,
}

/// Apply patches in order. A failure is recorded and the next patch is
/// still attempted.
pub async fn apply_patches(git: &dyn GitService, path: &Path, patches: &[String]) -> PatchReport {
    let mut report = PatchReport {
        found: patches.len(),
        ..Default::default()
    };
    for (index, patch) in patches.iter().enumerate() {
        match git.apply_patch(path, patch).await {
            Ok(()) => report.applied += 1,
            Err(e) => {
                let error = truncate_chars(&mask_secrets(&format!("{e:#}")), 1000);
                tracing::warn!(index, error = %error, "patch failed to apply");
                report.failures.push(PatchFailure { index, error });
            }
        }
    }
    report
}

/// A fenced block that names its target file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileBlock {
    pub path: String,
    pub content: String,
}

fn block_path(info: &str) -> Option<&str> {
    for token in info.split_whitespace() {
        for key in ["path=", "file=", "filename="] {
            if let Some(p) = token.strip_prefix(key) {
                return Some(p.trim_matches(|c| c == '"' || c == '\''));
            }
        }
    }
    let first = info.split_whitespace().next()?;
    let (_, path) = first.split_once(':')?;
    Some(path)
}

/// Reject absolute paths and anything that climbs out of the workspace.
pub fn is_safe_relative(path: &str) -> bool {
    let p = Path::new(path);
    !path.is_empty()
        && p.components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Fenced blocks whose info string names a file (`rust path=src/lib.rs`
/// or `rust:src/lib.rs`). Unsafe paths are dropped.
pub fn extract_file_blocks(text: &str) -> Vec<FileBlock> {
    fenced_blocks(text)
        .into_iter()
        .filter_map(|b| {
            let path = block_path(&b.info)?.to_string();
            if !is_safe_relative(&path) {
                tracing::warn!(path = %path, "ignoring code block with unsafe path");
                return None;
            }
            Some(FileBlock {
                path,
                content: b.body,
            })
        })
        .collect()
}

/// Write file blocks under `root`. Returns the paths written.
pub async fn write_file_blocks(root: &Path, blocks: &[FileBlock]) -> Result<Vec<String>> {
    let mut written = Vec::new();
    for block in blocks {
        if !is_safe_relative(&block.path) {
            bail!("refusing to write outside the workspace: {}", block.path);
        }
        let target = root.join(&block.path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        tokio::fs::write(&target, &block.content)
            .await
            .with_context(|| format!("writing {}", target.display()))?;
        tracing::warn!(path = %block.path, "wrote file from code block (legacy fallback)");
        written.push(block.path.clone());
    }
    Ok(written)
}
