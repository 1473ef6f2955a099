use std::sync::OnceLock;

use regex::Regex;

use crate::agent::runner::{ModelRunner, RunObserver, RunOptions, RunnerFailure};
use crate::redact::truncate_chars;

const PROMPT_LIMIT: usize = 500;
const SUMMARY_LIMIT: usize = 1000;
const DIFF_LIMIT: usize = 4000;
const FILE_LIMIT: usize = 50;
const SOFT_CAP: usize = 72;
const HARD_CAP: usize = 120;

/// Inputs to the commit-message call.
#[derive(Debug, Clone, Default)]
pub struct CommitMessageInput<'a> {
    pub prompt: &'a str,
    pub summary: &'a str,
    pub changed_files: &'a [String],
    pub diff_stat: &'a str,
}

/// Build the instruction sent to the small model.
pub fn build_request(input: &CommitMessageInput<'_>) -> String {
    let mut files: Vec<&str> = input
        .changed_files
        .iter()
        .take(FILE_LIMIT)
        .map(String::as_str)
        .collect();
    let extra = input.changed_files.len().saturating_sub(FILE_LIMIT);
    let more = format!("... and {extra} more");
    if extra > 0 {
        files.push(&more);
    }
    format!(
        "Write a single-line git commit subject (imperative mood, at most {SOFT_CAP} \
         characters) for the change below. Reply with the subject only.\n\n\
         Request:\n{}\n\nSummary:\n{}\n\nChanged files:\n{}\n\nDiff stat:\n{}\n",
        truncate_chars(input.prompt.trim(), PROMPT_LIMIT),
        truncate_chars(input.summary.trim(), SUMMARY_LIMIT),
        files.join("\n"),
        truncate_chars(input.diff_stat.trim(), DIFF_LIMIT),
    )
}

fn narrative_prefix() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^(now,?\s+|i'll\s+|i will\s+|let me\s+|let's\s+|first,?\s+|here's\s+|here is\s+|okay,?\s+|ok,?\s+|sure,?\s+|alright,?\s+)",
        )
        .ok()
    })
    .as_ref()
}

fn label_prefix() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(commit message|commit subject|subject|commit)\s*:\s*").ok())
        .as_ref()
}

fn strip_prefix(re: Option<&Regex>, s: &str) -> String {
    match re {
        Some(re) => re.replace(s, "").into_owned(),
        None => s.to_string(),
    }
}

fn strip_wrapping(s: &str) -> &str {
    let mut s = s.trim();
    loop {
        let before = s;
        for (open, close) in [('"', '"'), ('\'', '\''), ('`', '`'), ('“', '”')] {
            if s.len() >= 2 && s.starts_with(open) && s.ends_with(close) {
                s = s[open.len_utf8()..s.len() - close.len_utf8()].trim();
            }
        }
        if s == before {
            return s;
        }
    }
}

/// Reduce raw model output to a commit subject, or `None` when nothing
/// usable is left.
pub fn clean_commit_subject(raw: &str) -> Option<String> {
    let line = raw
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with("```"))?;
    let line = strip_prefix(label_prefix(), line);
    let line = strip_wrapping(&line).to_string();
    let mut line = line.split_whitespace().collect::<Vec<_>>().join(" ");

    loop {
        let stripped = strip_prefix(narrative_prefix(), &line);
        if stripped == line {
            break;
        }
        line = stripped;
    }
    let line = strip_prefix(label_prefix(), &line);
    let line = strip_wrapping(&line).trim_end_matches('.').trim();
    if line.is_empty() {
        return None;
    }

    let mut chars = line.chars();
    let mut subject: String = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => return None,
    };
    if subject.chars().count() > HARD_CAP {
        subject = truncate_chars(&subject, HARD_CAP);
    }
    Some(subject)
}

struct Silent;

impl RunObserver for Silent {
    fn on_start(&self) {}
    fn on_delta(&self, _text: &str, _output_tokens: u64) {}
    fn on_complete(&self) {}
    fn on_error(&self, _failure: &RunnerFailure) {}
}

/// Ask the runner for a commit subject. Any failure yields `None`.
pub async fn synthesize(
    runner: &dyn ModelRunner,
    input: &CommitMessageInput<'_>,
    options: RunOptions,
) -> Option<String> {
    let request = build_request(input);
    match runner.run_prompt(&request, options, &Silent).await {
        Ok(output) => {
            let subject = output.full_text.as_deref().and_then(clean_commit_subject);
            if subject.is_none() {
                tracing::debug!("commit message model returned nothing usable");
            }
            subject
        }
        Err(e) => {
            tracing::debug!(error = %crate::redact::mask_secrets(&format!("{e:#}")), "commit message synthesis failed");
            None
        }
    }
}
