//! Tool server configuration. Deserializes the `[mcp]` section
//! of the gateway config into one [`McpServerConfig`] per configured tool
//! server. The client/transport/protocol implementations live in the
//! `parley-mcp` crate; this module only carries the static config shape so
//! the gateway's config loader doesn't need to depend on it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Top-level tool server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct McpConfig {
    /// One entry per tool server, keyed by its unique id.
    #[serde(default)]
    pub servers: Vec<McpServerConfig>,

    /// Built-in presets that can be toggled on/off without hand-writing a
    /// full server entry.
    #[serde(default)]
    pub presets: McpPresets,
}

impl McpConfig {
    /// Return the effective, *enabled* server list: explicit servers plus
    /// any enabled presets, with disabled servers filtered out.
    pub fn effective_servers(&self) -> Vec<McpServerConfig> {
        let mut servers: Vec<McpServerConfig> =
            self.servers.iter().filter(|s| s.enabled).cloned().collect();

        if self.presets.browser.enabled {
            servers.push(McpServerConfig {
                id: "browser".into(),
                command: self
                    .presets
                    .browser
                    .command
                    .clone()
                    .unwrap_or_else(|| "npx".into()),
                args: self.presets.browser.args.clone().unwrap_or_else(|| {
                    vec!["-y".into(), "@anthropic-ai/mcp-server-puppeteer@latest".into()]
                }),
                transport: McpTransportKind::Stdio,
                url: None,
                env: HashMap::new(),
                working_directory: None,
                enabled: true,
                max_concurrency: None,
                dedicated_execution_lane: true,
            });
        }

        if self.presets.filesystem.enabled {
            servers.push(McpServerConfig {
                id: "filesystem".into(),
                command: self
                    .presets
                    .filesystem
                    .command
                    .clone()
                    .unwrap_or_else(|| "npx".into()),
                args: self.presets.filesystem.args.clone().unwrap_or_else(|| {
                    vec![
                        "-y".into(),
                        "@modelcontextprotocol/server-filesystem@latest".into(),
                        ".".into(),
                    ]
                }),
                transport: McpTransportKind::Stdio,
                url: None,
                env: HashMap::new(),
                working_directory: None,
                enabled: true,
                max_concurrency: None,
                dedicated_execution_lane: false,
            });
        }

        servers
    }
}

/// Built-in tool server presets that can be toggled via config.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct McpPresets {
    /// Browser automation via a Puppeteer-backed server.
    #[serde(default)]
    pub browser: McpPresetConfig,
    /// Filesystem access via a filesystem server.
    #[serde(default)]
    pub filesystem: McpPresetConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct McpPresetConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Option<Vec<String>>,
}

/// Configuration for a single tool server connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Unique identifier (used for namespacing: `{id}:{tool}`).
    pub id: String,
    /// The command to spawn for `stdio` transport (e.g. `"npx"`).
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub transport: McpTransportKind,
    /// Endpoint URL for `websocket` transport.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub working_directory: Option<PathBuf>,
    /// Whether this server is included in the manager's connected set.
    #[serde(default = "d_true")]
    pub enabled: bool,
    /// Per-server concurrency cap. `None` means bounded only by the global
    /// `tools.max_concurrency` semaphore.
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    /// Dispatch calls to this server on a dedicated scheduler thread instead
    /// of the shared tokio pool — for servers known to block or spin up
    /// heavyweight subprocesses per call (browser automation, "TICMaker"-class
    /// generators) where sharing the pool risks starving other servers.
    #[serde(default)]
    pub dedicated_execution_lane: bool,
}

fn d_true() -> bool {
    true
}

/// Transport kind for connecting to a tool server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum McpTransportKind {
    #[default]
    Stdio,
    Websocket,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_defaults() {
        let cfg: McpConfig = serde_json::from_str("{}").unwrap();
        assert!(cfg.servers.is_empty());
    }

    #[test]
    fn deserialize_server_config() {
        let raw = r#"{
            "id": "filesystem",
            "command": "npx",
            "args": ["-y", "@modelcontextprotocol/server-filesystem", "/tmp"],
            "transport": "stdio"
        }"#;
        let cfg: McpServerConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(cfg.id, "filesystem");
        assert_eq!(cfg.command, "npx");
        assert_eq!(cfg.args.len(), 3);
        assert_eq!(cfg.transport, McpTransportKind::Stdio);
        assert!(cfg.enabled);
    }

    #[test]
    fn transport_kind_defaults_to_stdio() {
        let raw = r#"{ "id": "test", "command": "echo" }"#;
        let cfg: McpServerConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(cfg.transport, McpTransportKind::Stdio);
    }

    #[test]
    fn websocket_transport() {
        let raw = r#"{ "id": "remote", "transport": "websocket", "url": "ws://localhost:8080" }"#;
        let cfg: McpServerConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(cfg.transport, McpTransportKind::Websocket);
        assert_eq!(cfg.url.as_deref(), Some("ws://localhost:8080"));
    }

    #[test]
    fn deserialize_with_env() {
        let raw = r#"{
            "id": "test",
            "command": "node",
            "args": ["server.js"],
            "env": { "NODE_ENV": "production" }
        }"#;
        let cfg: McpServerConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(cfg.env.get("NODE_ENV").unwrap(), "production");
    }

    #[test]
    fn disabled_server_excluded_from_effective_list() {
        let mut cfg = McpConfig::default();
        cfg.servers.push(McpServerConfig {
            id: "off".into(),
            command: "echo".into(),
            args: vec![],
            transport: McpTransportKind::Stdio,
            url: None,
            env: HashMap::new(),
            working_directory: None,
            enabled: false,
            max_concurrency: None,
            dedicated_execution_lane: false,
        });
        assert!(cfg.effective_servers().is_empty());
    }
}
