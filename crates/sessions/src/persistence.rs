//! On-disk persistence for ReAct engine sessions (one JSON file per session).
//!
//! Every state transition is written with a temp-file-then-rename sequence so
//! a crash or concurrent read never observes a half-written file. Filenames
//! encode the session id so a crash-recovery sweep can enumerate sessions
//! without a separate index.

use parley_domain::react::Session;
use std::io;
use std::path::{Path, PathBuf};

/// Errors that can occur while reading or writing session state.
#[derive(Debug, thiserror::Error)]
pub enum SessionPersistError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("session not found: {0}")]
    NotFound(String),
}

/// Reads and atomically writes [`Session`] state to disk, one file per
/// session under `base_dir`.
#[derive(Debug, Clone)]
pub struct SessionRepository {
    base_dir: PathBuf,
}

impl SessionRepository {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        self.base_dir.join(format!("{session_id}.json"))
    }

    /// Atomically persist the current session state.
    ///
    /// Writes to a sibling temp file and renames it over the target path —
    /// `rename` is atomic within the same filesystem, so a reader never sees
    /// a partially-written file.
    pub fn save(&self, session: &Session) -> Result<(), SessionPersistError> {
        std::fs::create_dir_all(&self.base_dir)?;
        let final_path = self.path_for(&session.id);
        let json = serde_json::to_vec_pretty(session)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.base_dir)?;
        use std::io::Write;
        tmp.write_all(&json)?;
        tmp.flush()?;
        tmp.persist(&final_path)
            .map_err(|e| SessionPersistError::Io(e.error))?;

        Ok(())
    }

    /// Load a session's state by id.
    pub fn load(&self, session_id: &str) -> Result<Session, SessionPersistError> {
        let path = self.path_for(session_id);
        if !path.exists() {
            return Err(SessionPersistError::NotFound(session_id.to_string()));
        }
        let raw = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Whether a session file exists.
    pub fn exists(&self, session_id: &str) -> bool {
        self.path_for(session_id).exists()
    }

    /// Delete a session's persisted state.
    pub fn remove(&self, session_id: &str) -> Result<(), SessionPersistError> {
        let path = self.path_for(session_id);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    /// List all session ids known to this repository by scanning `base_dir`.
    /// Used during crash recovery to find sessions left in a non-terminal
    /// state and surface them to the gateway for a decision (resume, fail,
    /// or leave awaiting confirmation).
    pub fn list_ids(&self) -> Result<Vec<String>, SessionPersistError> {
        if !self.base_dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        Ok(ids)
    }

    /// Load every non-terminal session found on disk.
    pub fn load_recoverable(&self) -> Result<Vec<Session>, SessionPersistError> {
        let mut sessions = Vec::new();
        for id in self.list_ids()? {
            let session = self.load(&id)?;
            if !session.state.is_terminal() {
                sessions.push(session);
            }
        }
        Ok(sessions)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_domain::react::SessionState;

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let repo = SessionRepository::new(dir.path());
        let session = Session::new("sess-1".into(), "list files".into(), 3);
        repo.save(&session).unwrap();

        let loaded = repo.load("sess-1").unwrap();
        assert_eq!(loaded.id, session.id);
        assert_eq!(loaded.user_input, session.user_input);
    }

    #[test]
    fn load_missing_session_errors() {
        let dir = tempfile::tempdir().unwrap();
        let repo = SessionRepository::new(dir.path());
        assert!(matches!(
            repo.load("nope"),
            Err(SessionPersistError::NotFound(_))
        ));
    }

    #[test]
    fn save_overwrites_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let repo = SessionRepository::new(dir.path());
        let mut session = Session::new("sess-2".into(), "do thing".into(), 3);
        repo.save(&session).unwrap();

        session.transition(SessionState::Reasoning, "started reasoning".into());
        repo.save(&session).unwrap();

        let loaded = repo.load("sess-2").unwrap();
        assert_eq!(loaded.state, SessionState::Reasoning);
        assert_eq!(loaded.log.len(), 1);
    }

    #[test]
    fn load_recoverable_skips_terminal_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let repo = SessionRepository::new(dir.path());

        let mut done = Session::new("done".into(), "finished task".into(), 3);
        done.transition(SessionState::Completed, "done".into());
        repo.save(&done).unwrap();

        let pending = Session::new("pending".into(), "in progress".into(), 3);
        repo.save(&pending).unwrap();

        let recoverable = repo.load_recoverable().unwrap();
        assert_eq!(recoverable.len(), 1);
        assert_eq!(recoverable[0].id, "pending");
    }

    #[test]
    fn remove_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let repo = SessionRepository::new(dir.path());
        let session = Session::new("gone".into(), "x".into(), 1);
        repo.save(&session).unwrap();
        assert!(repo.exists("gone"));
        repo.remove("gone").unwrap();
        assert!(!repo.exists("gone"));
    }
}
