//! Tool registry: a single, uniform surface over the built-in tools and
//! every tool discovered from a connected tool server.
//!
//! Remote tools are namespaced `server:tool`; a bare name resolves to a
//! built-in first, then to a remote tool if exactly one server exposes
//! it. An unresolvable name never silently falls back to a similarly
//! spelled tool — [`ToolRegistry::resolve`] returns a suggestion for the
//! caller (planner or human) to act on, but the call itself is refused.

mod alias;
mod suggest;

pub use alias::normalize_arguments;
pub use suggest::suggest;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use parley_domain::react::{ErrorCategory, ToolDescriptor, ToolResult};
use parley_mcp::{AsyncCallItem, McpManager};
use parley_tools::manager::ProcessManager;

/// The result of resolving a tool name against the registry.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// A built-in tool (no server prefix).
    Builtin(ToolDescriptor),
    /// A remote tool, fully namespaced `server:tool`.
    Remote { server_id: String, descriptor: ToolDescriptor },
    /// More than one server exposes a tool by this bare name; the caller
    /// must use the namespaced form.
    Ambiguous(Vec<String>),
    /// No exact match. `suggestion` is the closest known name, if any is
    /// close enough to be worth surfacing — never auto-selected.
    NotFound { suggestion: Option<String> },
}

/// Uniform view over built-in and remote tools.
pub struct ToolRegistry {
    mcp: Arc<McpManager>,
    process_manager: Arc<ProcessManager>,
    workspace_root: PathBuf,
    denied_commands: Arc<regex::RegexSet>,
    server_timeout: Duration,
}

impl ToolRegistry {
    pub fn new(
        mcp: Arc<McpManager>,
        process_manager: Arc<ProcessManager>,
        workspace_root: PathBuf,
        denied_commands: Arc<regex::RegexSet>,
        server_timeout: Duration,
    ) -> Self {
        Self {
            mcp,
            process_manager,
            workspace_root,
            denied_commands,
            server_timeout,
        }
    }

    fn builtins(&self) -> Vec<ToolDescriptor> {
        parley_tools::builtin_descriptors()
    }

    /// Every tool visible to the registry, built-ins first, remote tools
    /// namespaced as `server:tool`.
    pub async fn list_all(&self) -> Vec<ToolDescriptor> {
        let mut out = self.builtins();
        for (server_id, tool) in self.mcp.all_tools().await {
            out.push(ToolDescriptor {
                name: format!("{server_id}:{}", tool.name),
                description: tool.description,
                input_schema: tool.input_schema,
                server_id: Some(server_id),
                capabilities: Default::default(),
            });
        }
        out
    }

    /// Resolve a tool name to exactly one tool, per the order documented
    /// on [`Resolution`]: exact built-in, exact namespaced remote, unique
    /// bare-name remote alias, then a fuzzy suggestion (never a silent
    /// remap).
    pub async fn resolve(&self, name: &str) -> Resolution {
        if let Some(d) = self.builtins().into_iter().find(|d| d.name == name) {
            return Resolution::Builtin(d);
        }

        if let Some((server_id, tool_name)) = name.split_once(':') {
            if let Ok(tools) = self.mcp.tools_for(server_id).await {
                if let Some(t) = tools.into_iter().find(|t| t.name == tool_name) {
                    return Resolution::Remote {
                        server_id: server_id.to_string(),
                        descriptor: ToolDescriptor {
                            name: t.name,
                            description: t.description,
                            input_schema: t.input_schema,
                            server_id: Some(server_id.to_string()),
                            capabilities: Default::default(),
                        },
                    };
                }
            }
            return Resolution::NotFound { suggestion: self.suggest_among_all(name).await };
        }

        let all_remote = self.mcp.all_tools().await;
        let matches: Vec<(String, parley_mcp::McpToolDef)> =
            all_remote.into_iter().filter(|(_, t)| t.name == name).collect();

        match matches.len() {
            0 => Resolution::NotFound { suggestion: self.suggest_among_all(name).await },
            1 => {
                let (server_id, t) = matches.into_iter().next().unwrap();
                Resolution::Remote {
                    server_id: server_id.clone(),
                    descriptor: ToolDescriptor {
                        name: t.name,
                        description: t.description,
                        input_schema: t.input_schema,
                        server_id: Some(server_id),
                        capabilities: Default::default(),
                    },
                }
            }
            _ => Resolution::Ambiguous(matches.into_iter().map(|(s, _)| format!("{s}:{name}")).collect()),
        }
    }

    async fn suggest_among_all(&self, name: &str) -> Option<String> {
        let candidates: Vec<String> = self.list_all().await.into_iter().map(|d| d.name).collect();
        suggest(name, &candidates)
    }

    /// Synchronous tool call. Arguments are normalized against the
    /// registry's built-in argument alias map before dispatch.
    pub async fn call(&self, name: &str, arguments: Value) -> ToolResult {
        let arguments = normalize_arguments(&arguments);
        match self.resolve(name).await {
            Resolution::Builtin(descriptor) => {
                parley_tools::invoke(
                    &self.process_manager,
                    &self.workspace_root,
                    &self.denied_commands,
                    &descriptor.name,
                    arguments,
                )
                .await
            }
            Resolution::Remote { server_id, descriptor } => {
                match self.mcp.call_tool(&server_id, &descriptor.name, arguments).await {
                    Ok(payload) => ToolResult::Success {
                        payload,
                        duration_ms: 0,
                        server: Some(server_id),
                        tool: descriptor.name,
                    },
                    Err(e) => map_mcp_error(e),
                }
            }
            Resolution::Ambiguous(candidates) => ToolResult::Error {
                category: ErrorCategory::ToolNotFound,
                message: format!(
                    "tool name '{name}' is ambiguous across servers; use one of: {}",
                    candidates.join(", ")
                ),
                retryable: false,
            },
            Resolution::NotFound { suggestion } => ToolResult::Error {
                category: ErrorCategory::ToolNotFound,
                message: match suggestion {
                    Some(s) => format!("no tool named '{name}'; did you mean '{s}'?"),
                    None => format!("no tool named '{name}'"),
                },
                retryable: false,
            },
        }
    }

    /// Async-with-progress call. Built-ins have no progress extension, so
    /// they are run synchronously and surfaced as a single terminal item.
    pub async fn call_async(&self, name: &str, arguments: Value) -> tokio::sync::mpsc::Receiver<ToolResult> {
        let (tx, rx) = tokio::sync::mpsc::channel(32);
        let arguments = normalize_arguments(&arguments);

        match self.resolve(name).await {
            Resolution::Builtin(descriptor) => {
                let result = parley_tools::invoke(
                    &self.process_manager,
                    &self.workspace_root,
                    &self.denied_commands,
                    &descriptor.name,
                    arguments,
                )
                .await;
                let _ = tx.send(result).await;
            }
            Resolution::Remote { server_id, descriptor } => {
                match self
                    .mcp
                    .call_tool_async(&server_id, &descriptor.name, arguments, self.server_timeout)
                    .await
                {
                    Ok(mut items) => {
                        while let Some(item) = items.recv().await {
                            let result = match item {
                                AsyncCallItem::Progress(p) => ToolResult::Progress {
                                    step: p.step,
                                    progress_pct: p.progress_pct,
                                    payload: p.payload,
                                },
                                AsyncCallItem::Result(Ok(payload)) => ToolResult::Success {
                                    payload,
                                    duration_ms: 0,
                                    server: Some(server_id.clone()),
                                    tool: descriptor.name.clone(),
                                },
                                AsyncCallItem::Result(Err(e)) => ToolResult::Error {
                                    category: ErrorCategory::ToolExecutionError,
                                    message: e.message,
                                    retryable: false,
                                },
                            };
                            let terminal = result.is_terminal();
                            let _ = tx.send(result).await;
                            if terminal {
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(map_mcp_error(e)).await;
                    }
                }
            }
            Resolution::Ambiguous(candidates) => {
                let _ = tx
                    .send(ToolResult::Error {
                        category: ErrorCategory::ToolNotFound,
                        message: format!(
                            "tool name '{name}' is ambiguous across servers; use one of: {}",
                            candidates.join(", ")
                        ),
                        retryable: false,
                    })
                    .await;
            }
            Resolution::NotFound { suggestion } => {
                let _ = tx
                    .send(ToolResult::Error {
                        category: ErrorCategory::ToolNotFound,
                        message: match suggestion {
                            Some(s) => format!("no tool named '{name}'; did you mean '{s}'?"),
                            None => format!("no tool named '{name}'"),
                        },
                        retryable: false,
                    })
                    .await;
            }
        }

        rx
    }
}

fn map_mcp_error(e: parley_mcp::McpError) -> ToolResult {
    ToolResult::Error {
        category: ErrorCategory::ToolExecutionError,
        message: e.to_string(),
        retryable: matches!(e, parley_mcp::McpError::Timeout | parley_mcp::McpError::Degraded),
    }
}
