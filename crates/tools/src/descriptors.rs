//! Adapts the exec/process/file_ops tool bodies into the registry's uniform
//! [`ToolDescriptor`]/[`ToolResult`] shape so they sit in the same namespace
//! as tools discovered from a remote tool server.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use parley_domain::react::{ErrorCategory, ToolCapabilities, ToolDescriptor, ToolResult};
use serde_json::json;

use crate::exec::{self, ExecRequest};
use crate::file_ops::{self, FileAppendRequest, FileDeleteRequest, FileListRequest, FileMoveRequest, FileReadRequest, FileWriteRequest};
use crate::manager::ProcessManager;
use crate::process::{self, ProcessRequest};

/// Descriptors for every built-in tool, advertised to the registry exactly
/// as a remote server's `tools/list` response would be.
pub fn builtin_descriptors() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor {
            name: "exec".into(),
            description: "Run a shell command, in the foreground or as a tracked background session.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "command": {"type": "string"},
                    "background": {"type": "boolean"},
                    "yield_ms": {"type": "integer"},
                    "timeout_sec": {"type": "integer"},
                    "workdir": {"type": "string"},
                    "env": {"type": "object"}
                },
                "required": ["command"]
            }),
            server_id: None,
            capabilities: ToolCapabilities {
                read_only: false,
                requires_network: false,
                long_running: true,
                progress_capable: false,
            },
        },
        ToolDescriptor {
            name: "process".into(),
            description: "List, poll, log, write to, kill, clear, or remove a background exec session.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "action": {"type": "string", "enum": ["list", "poll", "log", "write", "kill", "clear", "remove"]},
                    "session_id": {"type": "string"},
                    "offset": {"type": "integer"},
                    "limit": {"type": "integer"},
                    "tail_lines": {"type": "integer"},
                    "data": {"type": "string"},
                    "eof": {"type": "boolean"}
                },
                "required": ["action"]
            }),
            server_id: None,
            capabilities: ToolCapabilities {
                read_only: false,
                requires_network: false,
                long_running: false,
                progress_capable: false,
            },
        },
        file_descriptor("file_read", "Read a file's contents, optionally windowed by line offset/limit.", true),
        file_descriptor("file_write", "Create or overwrite a file with the given content.", false),
        file_descriptor("file_append", "Append content to an existing (or new) file.", false),
        file_descriptor("file_move", "Move or rename a file or directory.", false),
        file_descriptor("file_delete", "Delete a file or empty directory.", false),
        file_descriptor("file_list", "List the entries of a directory with size/mtime metadata.", true),
    ]
}

fn file_descriptor(name: &str, description: &str, read_only: bool) -> ToolDescriptor {
    ToolDescriptor {
        name: name.into(),
        description: description.into(),
        input_schema: json!({"type": "object"}),
        server_id: None,
        capabilities: ToolCapabilities {
            read_only,
            requires_network: false,
            long_running: false,
            progress_capable: false,
        },
    }
}

/// Dispatch a built-in tool call by name, producing the same terminal
/// [`ToolResult`] shape a tool server client would yield.
///
/// `denied_commands` gates `exec` before anything spawns — a match is a
/// configuration-level refusal, not a tool-execution failure, so it is
/// reported as `ErrorCategory::ConfigError` rather than `ToolExecutionError`.
pub async fn invoke(
    manager: &ProcessManager,
    workspace_root: &Path,
    denied_commands: &Arc<regex::RegexSet>,
    name: &str,
    args: serde_json::Value,
) -> ToolResult {
    let started = Instant::now();
    let outcome = match name {
        "exec" => {
            let req: ExecRequest = match serde_json::from_value(args) {
                Ok(r) => r,
                Err(e) => return bad_args(e),
            };
            if denied_commands.is_match(&req.command) {
                return ToolResult::Error {
                    category: ErrorCategory::ConfigError,
                    message: format!("command '{}' matches a denied pattern", req.command),
                    retryable: false,
                };
            }
            let resp = exec::exec(manager, req).await;
            Ok(serde_json::to_value(resp).unwrap_or_default())
        }
        "process" => {
            let req: ProcessRequest = match serde_json::from_value(args) {
                Ok(r) => r,
                Err(e) => return bad_args(e),
            };
            let resp = process::handle_process(manager, req).await;
            if resp.success {
                Ok(serde_json::to_value(resp).unwrap_or_default())
            } else {
                Err(resp.error.unwrap_or_else(|| "process action failed".into()))
            }
        }
        "file_read" => from_value(args).and_then_async(|r: FileReadRequest| file_ops::file_read(workspace_root, r)).await,
        "file_write" => from_value(args).and_then_async(|r: FileWriteRequest| file_ops::file_write(workspace_root, r)).await,
        "file_append" => from_value(args).and_then_async(|r: FileAppendRequest| file_ops::file_append(workspace_root, r)).await,
        "file_move" => from_value(args).and_then_async(|r: FileMoveRequest| file_ops::file_move(workspace_root, r)).await,
        "file_delete" => from_value(args).and_then_async(|r: FileDeleteRequest| file_ops::file_delete(workspace_root, r)).await,
        "file_list" => from_value(args).and_then_async(|r: FileListRequest| file_ops::file_list(workspace_root, r)).await,
        other => {
            return ToolResult::Error {
                category: ErrorCategory::ToolNotFound,
                message: format!("no built-in tool named '{other}'"),
                retryable: false,
            }
        }
    };

    let duration_ms = started.elapsed().as_millis() as u64;
    match outcome {
        Ok(payload) => ToolResult::Success {
            payload,
            duration_ms,
            server: None,
            tool: name.to_string(),
        },
        Err(message) => ToolResult::Error {
            category: ErrorCategory::ToolExecutionError,
            message,
            retryable: false,
        },
    }
}

fn bad_args(e: serde_json::Error) -> ToolResult {
    ToolResult::Error {
        category: ErrorCategory::ToolExecutionError,
        message: format!("invalid arguments: {e}"),
        retryable: false,
    }
}

/// Deserialize-then-call helper so each `file_*` arm stays one line above.
fn from_value<T: serde::de::DeserializeOwned>(args: serde_json::Value) -> DeserializeResult<T> {
    DeserializeResult(serde_json::from_value(args))
}

struct DeserializeResult<T>(Result<T, serde_json::Error>);

impl<T> DeserializeResult<T> {
    async fn and_then_async<F, Fut>(self, f: F) -> Result<serde_json::Value, String>
    where
        F: FnOnce(T) -> Fut,
        Fut: std::future::Future<Output = Result<serde_json::Value, String>>,
    {
        match self.0 {
            Ok(v) => f(v).await,
            Err(e) => Err(format!("invalid arguments: {e}")),
        }
    }
}
