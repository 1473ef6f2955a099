use clap::Subcommand;
use serde_json::{Map, Value};
use shipwright_pipeline::PipelineConfig;
use std::path::Path;

// ── CLI Schema ──

#[derive(Subcommand)]
pub enum ConfigCmd {
    /// Set a config value
    Set {
        /// Config key (e.g. apply_patches)
        key: String,
        /// Config value (true/false/null/number/string)
        value: String,
    },
    /// Get a config value
    Get {
        /// Config key
        key: String,
    },
    /// List all config values
    List,
}

/// Keys `PipelineConfig` reads from `config.json`.
const KNOWN_KEYS: &[&str] = &[
    "apply_patches",
    "legacy_code_block_fallback",
    "automation_kill_switch",
    "git_host",
    "commit_message_model",
    "branch_prefix",
    "store_root",
];

// ── Dispatch ──

pub fn run(cmd: ConfigCmd, root: &Path) -> anyhow::Result<()> {
    match cmd {
        ConfigCmd::Set { key, value } => set(root, &key, &value),
        ConfigCmd::Get { key } => get(root, &key),
        ConfigCmd::List => list(root),
    }
}

// ── Command Implementations ──

/// Read `config.json`. Returns an empty map if the file doesn't exist.
fn read_config(path: &Path) -> anyhow::Result<Map<String, Value>> {
    if !path.exists() {
        return Ok(Map::new());
    }
    let content = std::fs::read_to_string(path)?;
    match serde_json::from_str(&content)? {
        Value::Object(map) => Ok(map),
        _ => Ok(Map::new()),
    }
}

fn write_config(path: &Path, config: &Map<String, Value>) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(config)?;
    shipwright_store::write_atomic(path, json.as_bytes())
}

/// Parse a string value into an appropriate JSON value (bool/null/number/string).
fn parse_value(s: &str) -> Value {
    match s {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "null" => Value::Null,
        _ => {
            if let Ok(n) = s.parse::<i64>() {
                Value::Number(n.into())
            } else if let Ok(f) = s.parse::<f64>() {
                serde_json::json!(f)
            } else {
                Value::String(s.to_string())
            }
        }
    }
}

fn check_key(key: &str) -> anyhow::Result<()> {
    if !KNOWN_KEYS.contains(&key) {
        anyhow::bail!(
            "unknown config key '{key}'. Known keys: {}",
            KNOWN_KEYS.join(", ")
        );
    }
    Ok(())
}

/// `shipwright config set <key> <value>`
pub fn set(root: &Path, key: &str, value: &str) -> anyhow::Result<()> {
    check_key(key)?;
    let path = shipwright_store::config_path(root);
    let mut config = read_config(&path)?;
    config.insert(key.to_string(), parse_value(value));
    // Reject values the pipeline would fail to load.
    serde_json::from_value::<PipelineConfig>(Value::Object(config.clone()))
        .map_err(|e| anyhow::anyhow!("invalid value for {key}: {e}"))?;
    write_config(&path, &config)?;
    println!("{key} = {value}");
    Ok(())
}

/// `shipwright config get <key>`
pub fn get(root: &Path, key: &str) -> anyhow::Result<()> {
    check_key(key)?;
    let config = read_config(&shipwright_store::config_path(root))?;
    match config.get(key) {
        Some(val) => println!("{val}"),
        None => println!("(not set)"),
    }
    Ok(())
}

/// `shipwright config list`
pub fn list(root: &Path) -> anyhow::Result<()> {
    let config = read_config(&shipwright_store::config_path(root))?;
    if config.is_empty() {
        println!("(no config set)");
    } else {
        for (k, v) in &config {
            println!("{k} = {v}");
        }
    }
    Ok(())
}
