//! Shared domain types for the Parley ReAct gateway.
//!
//! This crate has no async runtime or I/O dependencies of its own — it only
//! defines the wire-level and in-process data model shared by every other
//! crate in the workspace: configuration (`config`), the ReAct session/task/
//! tool model (`react`), LLM message/tool types (`tool`), streaming events
//! (`stream`), capability descriptors (`capability`), the shared error type
//! (`error`), and structured trace events (`trace`).

pub mod capability;
pub mod config;
pub mod error;
pub mod react;
pub mod stream;
pub mod tool;
pub mod trace;

pub use error::{Error, Result};
