use anyhow::Result;
use serde::Deserialize;
use shipwright_core::{CostData, TokenUsage, ToolUseRecord};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::agent::runner::{RunObserver, RunnerFailure, RunnerOutput};

/// Relevant fields from Claude Code's stream-json output.
/// Unknown message types deserialize to `Unknown`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum StreamMessage {
    #[serde(rename = "system")]
    System {
        #[serde(default)]
        subtype: Option<String>,
        #[serde(default)]
        model: Option<String>,
    },
    #[serde(rename = "assistant")]
    Assistant { message: serde_json::Value },
    #[serde(rename = "result")]
    Result {
        subtype: String,
        #[serde(default)]
        total_cost_usd: Option<f64>,
        #[serde(default)]
        error: Option<String>,
        #[serde(default, rename = "result")]
        result_text: Option<String>,
        #[serde(default)]
        usage: Option<WireUsage>,
        #[serde(default)]
        stop_reason: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct WireUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

/// Extracted info from the last `result` message.
#[derive(Debug, Clone)]
pub struct ResultInfo {
    pub subtype: String,
    pub total_cost_usd: Option<f64>,
    pub error: Option<String>,
    pub result_text: Option<String>,
    pub usage: Option<TokenUsage>,
    pub stop_reason: Option<String>,
}

/// Aggregated output from monitoring a stream.
#[derive(Debug, Default)]
pub struct MonitorResult {
    /// Assistant text as it streamed.
    pub text: String,
    pub output_tokens: u64,
    pub tool_use: Vec<ToolUseRecord>,
    pub model: Option<String>,
    pub result: Option<ResultInfo>,
}

/// Reads `--output-format stream-json` lines, forwarding assistant text to
/// the observer as it arrives.
pub struct StreamMonitor<R> {
    reader: R,
    tee_writer: Option<std::io::BufWriter<std::fs::File>>,
}

impl<R: AsyncBufRead + Unpin> StreamMonitor<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            tee_writer: None,
        }
    }

    /// Tee raw lines to a transcript file. Skipped if the file can't be opened.
    pub fn with_tee(mut self, path: Option<std::path::PathBuf>) -> Self {
        if let Some(p) = path {
            if let Some(parent) = p.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            if let Ok(file) = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&p)
            {
                self.tee_writer = Some(std::io::BufWriter::new(file));
            }
        }
        self
    }

    /// Read until EOF.
    pub async fn run(&mut self, observer: &dyn RunObserver) -> Result<MonitorResult> {
        let mut out = MonitorResult::default();
        let mut reported_tokens = 0u64;
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line).await? == 0 {
                break;
            }
            if let Some(ref mut w) = self.tee_writer {
                use std::io::Write;
                let _ = w.write_all(line.as_bytes());
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            // Non-JSON lines are ignored.
            let Ok(msg) = serde_json::from_str::<StreamMessage>(trimmed) else {
                continue;
            };
            match msg {
                StreamMessage::System { model, .. } => {
                    if model.is_some() {
                        out.model = model;
                    }
                }
                StreamMessage::Assistant { message } => {
                    if let Some(n) = message
                        .pointer("/usage/output_tokens")
                        .and_then(|v| v.as_u64())
                    {
                        reported_tokens += n;
                    }
                    let Some(content) = message.get("content").and_then(|c| c.as_array()) else {
                        continue;
                    };
                    for item in content {
                        match item.get("type").and_then(|t| t.as_str()) {
                            Some("text") => {
                                let Some(text) = item.get("text").and_then(|t| t.as_str()) else {
                                    continue;
                                };
                                out.text.push_str(text);
                                let estimate = out.text.chars().count().div_ceil(4) as u64;
                                out.output_tokens = reported_tokens.max(estimate);
                                observer.on_delta(text, out.output_tokens);
                            }
                            Some("tool_use") => out.tool_use.push(ToolUseRecord {
                                id: item.get("id").and_then(|v| v.as_str()).map(String::from),
                                name: item
                                    .get("name")
                                    .and_then(|v| v.as_str())
                                    .unwrap_or("?")
                                    .to_string(),
                                input: item.get("input").cloned().unwrap_or_default(),
                            }),
                            _ => {}
                        }
                    }
                }
                StreamMessage::Result {
                    subtype,
                    total_cost_usd,
                    error,
                    result_text,
                    usage,
                    stop_reason,
                } => {
                    out.result = Some(ResultInfo {
                        subtype,
                        total_cost_usd,
                        error,
                        result_text,
                        usage: usage.map(|u| TokenUsage {
                            input: u.input_tokens,
                            output: u.output_tokens,
                        }),
                        stop_reason,
                    });
                }
                StreamMessage::Unknown => {}
            }
        }
        if let Some(ref mut w) = self.tee_writer {
            use std::io::Write;
            let _ = w.flush();
        }
        Ok(out)
    }
}

/// Turn a finished stream plus exit code into the runner's output, or the
/// failure it ended with.
pub fn into_output(
    monitor: MonitorResult,
    exit_code: Option<i32>,
) -> std::result::Result<RunnerOutput, RunnerFailure> {
    let Some(info) = monitor.result else {
        return Err(RunnerFailure {
            message: format!(
                "runner exited with code {} without result",
                exit_code.unwrap_or(-1)
            ),
            exit_code,
            ..Default::default()
        });
    };
    if info.subtype != "success" {
        let message = info
            .error
            .or(info.result_text)
            .unwrap_or_else(|| format!("run ended with {}", info.subtype));
        return Err(RunnerFailure {
            message,
            exit_code,
            ..Default::default()
        });
    }
    let cost = (info.total_cost_usd.is_some() || monitor.model.is_some()).then(|| CostData {
        total_usd: info.total_cost_usd,
        model: monitor.model.clone(),
    });
    Ok(RunnerOutput {
        full_text: info.result_text.or_else(|| {
            (!monitor.text.is_empty()).then_some(monitor.text)
        }),
        usage: info.usage,
        stop_reason: info.stop_reason,
        tool_use: monitor.tool_use,
        cost,
    })
}
