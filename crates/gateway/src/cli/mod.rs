pub mod chat;
pub mod config;
pub mod doctor;
pub mod init;
pub mod run;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::Deserialize;

/// parley — a ReAct agent gateway.
#[derive(Debug, Parser)]
#[command(name = "parley", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to a config file, overriding the default layered lookup.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the gateway server (default when no subcommand is given).
    Serve,
    /// Start an interactive REPL against the agent.
    Chat,
    /// Run diagnostic checks against the current configuration.
    Doctor,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Initialize a new parley project in the current directory.
    Init {
        /// Skip interactive prompts and use sensible defaults (OpenAI provider).
        #[arg(long)]
        defaults: bool,
    },
    /// Send a single message to the agent and print the response.
    Run {
        /// The message to send.
        message: String,
        /// Session id (defaults to "cli:run").
        #[arg(long, default_value = "cli:run")]
        session: String,
        /// Model override (e.g. "openai/gpt-4o").
        #[arg(long)]
        model: Option<String>,
        /// Output every update as a JSON array instead of plain text.
        #[arg(long)]
        json: bool,
    },
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config and report any validation issues.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading ────────────────────────────────────────────────────

/// Load configuration, layering (lowest to highest precedence):
/// built-in defaults, the user config at `~/.config/parley/config.toml`,
/// the project config at `./config.toml`, and environment variable
/// overrides (`PARLEY_SERVER_HOST`, `PARLEY_SERVER_PORT`). A `--config`
/// CLI override, when given, replaces the project-config layer entirely
/// rather than merging with it.
///
/// Returns the resolved [`parley_domain::config::Config`] and a
/// human-readable description of the file(s) consulted, for `doctor`/
/// `config show` to report back.
pub fn load_config(cli_override: Option<&Path>) -> anyhow::Result<(parley_domain::config::Config, String)> {
    let mut merged = toml::Value::Table(toml::map::Map::new());
    let mut sources = Vec::new();

    if let Some(user_path) = dirs::config_dir().map(|d| d.join("parley").join("config.toml")) {
        if let Some(value) = read_toml_layer(&user_path)? {
            merge_toml(&mut merged, value);
            sources.push(user_path.display().to_string());
        }
    }

    let project_path = cli_override.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("config.toml"));
    if let Some(value) = read_toml_layer(&project_path)? {
        merge_toml(&mut merged, value);
        sources.push(project_path.display().to_string());
    }

    apply_env_overrides(&mut merged);

    let config = parley_domain::config::Config::deserialize(merged)
        .map_err(|e| anyhow::anyhow!("assembling layered config: {e}"))?;

    let description = if sources.is_empty() { "built-in defaults (no config file found)".to_string() } else { sources.join(", ") };
    Ok((config, description))
}

fn read_toml_layer(path: &Path) -> anyhow::Result<Option<toml::Value>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path).map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
    let value: toml::Value = toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {}: {e}", path.display()))?;
    Ok(Some(value))
}

/// Recursively merge `overlay` into `base`, with `overlay` winning on
/// conflicting scalar/array keys. Nested tables are merged key by key so a
/// project config can override a single field without repeating the rest
/// of the table the user config set.
fn merge_toml(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(existing) => merge_toml(existing, value),
                    None => {
                        base_table.insert(key, value);
                    }
                }
            }
        }
        (base_slot, overlay_value) => *base_slot = overlay_value,
    }
}

/// A handful of operationally relevant fields are overridable straight
/// from the environment, without requiring a config file edit — mainly
/// for container deployments that pin host/port via env.
fn apply_env_overrides(merged: &mut toml::Value) {
    let table = match merged {
        toml::Value::Table(t) => t,
        _ => return,
    };
    if let Ok(host) = std::env::var("PARLEY_SERVER_HOST") {
        let server = table.entry("server").or_insert_with(|| toml::Value::Table(Default::default()));
        if let toml::Value::Table(server) = server {
            server.insert("host".to_string(), toml::Value::String(host));
        }
    }
    if let Ok(port) = std::env::var("PARLEY_SERVER_PORT") {
        if let Ok(port) = port.parse::<i64>() {
            let server = table.entry("server").or_insert_with(|| toml::Value::Table(Default::default()));
            if let toml::Value::Table(server) = server {
                server.insert("port".to_string(), toml::Value::Integer(port));
            }
        }
    }
}
