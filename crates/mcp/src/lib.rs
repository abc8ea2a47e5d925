//! `parley-mcp` — MCP (Model Context Protocol) client.
//!
//! This crate provides:
//! - JSON-RPC 2.0 protocol types for communicating with tool servers.
//! - Stdio and WebSocket transports.
//! - [`McpClient`], which owns one server's connection state machine,
//!   handshake, and reconnect policy.
//! - [`McpManager`], which owns one client per configured server and adds
//!   concurrency bounds, execution-lane dispatch, and health monitoring.
//!
//! # Usage
//!
//! ```rust,ignore
//! use parley_mcp::{McpConfig, McpManager};
//! use std::time::Duration;
//!
//! let config: McpConfig = /* from TOML */;
//! let manager = McpManager::from_config(&config, 10, Duration::from_secs(30)).await;
//!
//! for (server_id, tool) in manager.all_tools().await {
//!     println!("{server_id}:{}", tool.name);
//! }
//!
//! let result = manager.call_tool("filesystem", "read_file", serde_json::json!({"path": "/tmp/test.txt"})).await?;
//! ```

pub mod client;
pub mod config;
pub mod manager;
pub mod protocol;
pub mod transport;

// Re-exports for convenience.
pub use client::{AsyncCallItem, ClientState, McpClient, McpError};
pub use config::{McpConfig, McpServerConfig, McpTransportKind};
pub use manager::McpManager;
pub use protocol::McpToolDef;
