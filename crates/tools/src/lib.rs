//! Built-in tools exposed directly by the gateway (no external tool server).
//!
//! - `exec` / `process`: run commands in the foreground or as tracked
//!   background sessions (list/poll/log/write/kill/clear/remove).
//! - `file_ops`: workspace-bounded file read/write/move/delete/list.
//!
//! [`descriptors`] adapts both groups into [`parley_domain::react::ToolDescriptor`]s
//! and [`invoke`] dispatches a call by tool name, producing the same
//! [`parley_domain::react::ToolResult`] shape the registry expects from a
//! remote tool server.

pub mod descriptors;
pub mod exec;
pub mod file_ops;
pub mod manager;
pub mod process;

pub use descriptors::{builtin_descriptors, invoke};
pub use manager::ProcessManager;
