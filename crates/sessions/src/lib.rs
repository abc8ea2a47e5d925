//! Session persistence for the parley gateway.
//!
//! Holds the on-disk representation of a ReAct [`parley_domain::react::Session`]
//! — one JSON file per session, atomically replaced on every state transition.

pub mod persistence;

pub use persistence::{SessionPersistError, SessionRepository};
