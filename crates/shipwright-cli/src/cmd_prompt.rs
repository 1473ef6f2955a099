use anyhow::{Context, Result};
use serde_json::{json, Map, Value};
use shipwright_core::automation::{AutomationResult, AutomationStatus};
use shipwright_core::content::{ContentBlock, ContextFile};
use shipwright_core::context::AgentContext;
use shipwright_core::session::Session;
use shipwright_pipeline::agent::claude::ClaudeCodeRunner;
use shipwright_pipeline::automation::GitCommitAutomation;
use shipwright_pipeline::diagnostics::EnvironmentDiagnostics;
use shipwright_pipeline::git::GitCli;
use shipwright_pipeline::runner::notify::{ProgressEvent, ProgressSink, ProgressStatus, TracingSink};
use shipwright_pipeline::session::{JsonSessionStore, SessionStore};
use shipwright_pipeline::workspace::LocalWorkspaces;
use shipwright_pipeline::{Pipeline, PipelineConfig, ProcessPromptOptions, PromptResult};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Flags of `shipwright prompt`.
pub struct PromptArgs {
    pub text: String,
    pub session: String,
    pub repo: Option<String>,
    pub branch: Option<String>,
    pub base: Option<String>,
    pub issue: Option<u64>,
    pub files: Vec<PathBuf>,
    pub model: Option<String>,
    pub dry_run: bool,
    pub no_automation: bool,
    pub apply_patches: bool,
    pub ephemeral: bool,
    pub json: bool,
}

/// Streams model output to stderr as it arrives.
#[derive(Default)]
struct ConsoleSink {
    printed: Mutex<usize>,
}

impl ProgressSink for ConsoleSink {
    fn emit(&self, event: ProgressEvent) {
        let Some(text) = event.text.as_deref() else {
            if event.status == ProgressStatus::Completed {
                eprintln!();
            }
            return;
        };
        let Ok(mut printed) = self.printed.lock() else {
            return;
        };
        if let Some(new) = text.get(*printed..) {
            eprint!("{new}");
        }
        *printed = text.len();
    }
}

/// Per-call context built from the flags. Only set fields override what
/// the session already carries.
fn agent_context(args: &PromptArgs) -> AgentContext {
    let mut automation = Map::new();
    if let Some(issue) = args.issue {
        automation.insert("issue".into(), json!(issue));
    }
    if args.dry_run {
        automation.insert("dryRun".into(), Value::Bool(true));
    }
    if args.no_automation {
        automation.insert("disabled".into(), Value::Bool(true));
        automation.insert("reason".into(), json!("disabled with --no-automation"));
    }
    AgentContext {
        repository: args.repo.clone().map(Value::String),
        branch: args.branch.clone(),
        base_branch: args.base.clone(),
        automation,
        ..Default::default()
    }
}

fn context_files(paths: &[PathBuf]) -> Result<Vec<ContextFile>> {
    paths
        .iter()
        .map(|p| {
            let content = std::fs::read_to_string(p)
                .with_context(|| format!("reading context file: {}", p.display()))?;
            Ok(ContextFile {
                path: p.display().to_string(),
                content,
            })
        })
        .collect()
}

/// Execute `shipwright prompt`.
pub fn run(args: PromptArgs, root: &Path, cancel: CancellationToken) -> Result<()> {
    let mut config = PipelineConfig::load(root)?;
    if config.store_root.is_none() {
        config.store_root = Some(root.to_path_buf());
    }
    let data_root = config.root();

    let runner = ClaudeCodeRunner::new().with_transcripts(Some(data_root.join("transcripts")));
    runner.verify_available()?;

    let files = context_files(&args.files)?;
    let sessions = Arc::new(JsonSessionStore::new(&data_root));
    let git = Arc::new(GitCli::new());
    let automation = Arc::new(GitCommitAutomation::new(git.clone(), config.git_host.clone()));
    let sink: Arc<dyn ProgressSink> = if args.json {
        Arc::new(TracingSink)
    } else {
        Arc::new(ConsoleSink::default())
    };

    let options = ProcessPromptOptions {
        session_id: args.session.clone(),
        content: vec![ContentBlock::text(args.text.clone())],
        context_files: files,
        agent_context: Some(agent_context(&args)),
        model_override: args.model.clone(),
        cancel,
        ephemeral_workspace: args.ephemeral,
        apply_patches: args.apply_patches.then_some(true),
        ..Default::default()
    };

    let pipeline = Pipeline::new(
        sessions.clone(),
        Arc::new(LocalWorkspaces::new(&data_root)),
        git,
        Arc::new(runner),
        config,
    )
    .with_automation(automation)
    .with_diagnostics(Arc::new(EnvironmentDiagnostics::default()))
    .with_sink(sink);

    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(async {
        if sessions.load(&args.session).await?.is_none() {
            sessions.save(&Session::new(args.session.as_str())).await?;
            tracing::info!(session_id = %args.session, "session created");
        }
        anyhow::Ok(pipeline.process_prompt(options).await?)
    })?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }
    Ok(())
}

fn print_result(result: &PromptResult) {
    println!();
    println!(
        "stop: {:?}  tokens: {} in / {} out  ({})",
        result.stop_reason, result.usage.input, result.usage.output, result.operation_id
    );
    if let Some(error) = &result.error {
        println!("error: [{}] {}", error.code, error.message);
        if let Some(hint) = &error.retry_hint {
            println!("  hint: {hint}");
        }
    }
    if let Some(patches) = &result.patches {
        println!("patches: {}/{} applied", patches.applied, patches.found);
        for failure in &patches.failures {
            println!("  #{} failed: {}", failure.index, failure.error);
        }
    }
    if let Some(changes) = &result.changes {
        if !changes.changed_files.is_empty() {
            println!("changed files:");
            for f in &changes.changed_files {
                println!("  {f}");
            }
        }
    }
    if let Some(automation) = &result.automation {
        print_automation(automation);
    }
    for warning in &result.warnings {
        println!("warning: {warning}");
    }
}

fn print_automation(automation: &AutomationResult) {
    match automation.status {
        AutomationStatus::Success => {
            println!(
                "automation: success  branch {}",
                automation.branch.as_deref().unwrap_or("-")
            );
            if let Some(commit) = &automation.commit {
                println!("  commit {} {}", &commit.sha[..commit.sha.len().min(12)], commit.message);
            }
            if let Some(pr) = &automation.pull_request {
                println!("  pull request #{} {}", pr.number, pr.url);
            }
        }
        AutomationStatus::Skipped => println!(
            "automation: skipped ({})",
            automation.skipped_reason.as_deref().unwrap_or("no reason")
        ),
        AutomationStatus::Error => {
            let message = automation
                .error
                .as_ref()
                .map(|e| format!("[{}] {}", e.code, e.message))
                .unwrap_or_default();
            println!("automation: error {message}");
        }
    }
}
