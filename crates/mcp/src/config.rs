//! Tool server configuration — re-exported from `parley-domain`.
//!
//! The canonical definitions live in `parley_domain::config` so that the
//! gateway config deserializer can include them without depending on
//! the full tool-server client crate. See `parley_domain::config::mcp`
//! for the deserialization tests.

pub use parley_domain::config::{McpConfig, McpPresetConfig, McpPresets, McpServerConfig, McpTransportKind};
