//! CLI and HTTP façade: wires the engine, planner, registry, and confirmation
//! crates into a running `parley` process, either as a long-lived server
//! (`serve`) or a one-shot/interactive CLI (`run`, `chat`).

pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod state;
