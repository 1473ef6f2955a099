mod cmd_config;
mod cmd_history;
mod cmd_prompt;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "shipwright",
    version,
    about = "Turn a change request into a reviewable branch"
)]
struct Cli {
    /// Store root (default: per-user data directory)
    #[arg(long, global = true, env = "SHIPWRIGHT_HOME")]
    root: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a prompt against a session's workspace
    Prompt {
        /// Change request text
        text: String,
        /// Session ID (created if it does not exist)
        #[arg(long, short)]
        session: String,
        /// Repository: owner/name or clone URL
        #[arg(long)]
        repo: Option<String>,
        /// Working branch
        #[arg(long)]
        branch: Option<String>,
        /// Base branch for the pull request
        #[arg(long)]
        base: Option<String>,
        /// Existing issue number the change resolves
        #[arg(long)]
        issue: Option<u64>,
        /// Attach a file as context (repeatable)
        #[arg(long = "file")]
        files: Vec<PathBuf>,
        /// Model override for the main run
        #[arg(long)]
        model: Option<String>,
        /// Commit locally but do not push
        #[arg(long)]
        dry_run: bool,
        /// Never publish anything for this turn
        #[arg(long)]
        no_automation: bool,
        /// Apply unified diffs found in the model output
        #[arg(long)]
        apply_patches: bool,
        /// Use a throwaway workspace
        #[arg(long)]
        ephemeral: bool,
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a session's conversation history
    History {
        /// Session ID
        session: String,
        /// Only the last N messages
        #[arg(long)]
        limit: Option<usize>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage pipeline configuration
    Config {
        #[command(subcommand)]
        cmd: cmd_config::ConfigCmd,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("SHIPWRIGHT_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Where sessions live: `store_root` from config.json when set, else `root`.
fn data_root(root: &Path) -> anyhow::Result<PathBuf> {
    let config = shipwright_pipeline::PipelineConfig::load(root)?;
    Ok(config.store_root.unwrap_or_else(|| root.to_path_buf()))
}

fn ctrlc_cancel(cancel: CancellationToken) {
    let _ = ctrlc::set_handler(move || {
        cancel.cancel();
    });
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();
    let root = cli.root.unwrap_or_else(shipwright_store::store_root);

    match cli.cmd {
        Command::Prompt {
            text,
            session,
            repo,
            branch,
            base,
            issue,
            files,
            model,
            dry_run,
            no_automation,
            apply_patches,
            ephemeral,
            json,
        } => {
            let cancel = CancellationToken::new();
            ctrlc_cancel(cancel.clone());
            let args = cmd_prompt::PromptArgs {
                text,
                session,
                repo,
                branch,
                base,
                issue,
                files,
                model,
                dry_run,
                no_automation,
                apply_patches,
                ephemeral,
                json,
            };
            cmd_prompt::run(args, &root, cancel)
        }
        Command::History {
            session,
            limit,
            json,
        } => cmd_history::run(&data_root(&root)?, &session, limit, json),
        Command::Config { cmd } => cmd_config::run(cmd, &root),
    }
}
