//! Confirmation coordinator: gates a planned task list behind an explicit
//! human decision before the ReAct engine executes it.
//!
//! Mirrors the exec-approval workflow's shape (a process-local map of
//! pending decisions resolved by a one-shot channel) but keyed by session
//! id, since confirmation is a per-session gate on an entire plan rather
//! than a per-command approval. At most one confirmation is ever pending
//! for a given session — a new request for a session that already has one
//! pending replaces it, and the stale waiter is reported as cancelled.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use parley_domain::react::{ConfirmationAction, ConfirmationRecord, ConfirmationStatus, ConfirmationVerdict};

/// A confirmation waiting for a human decision.
struct Pending {
    record: ConfirmationRecord,
    respond: oneshot::Sender<ConfirmationVerdict>,
}

/// Process-local store of pending confirmations, one per session.
pub struct ConfirmationCoordinator {
    pending: Mutex<HashMap<String, Pending>>,
}

impl Default for ConfirmationCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfirmationCoordinator {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Open a confirmation gate for a session. If one was already pending
    /// for this session, it is dropped (its waiter sees a closed channel,
    /// which the engine treats the same as a timeout/cancel) and replaced —
    /// there is only ever one live confirmation per session.
    ///
    /// `round` is the caller-supplied replan/modify round number; the
    /// coordinator does not track round history itself, only the record it
    /// was given.
    pub fn request_confirmation(
        &self,
        session_id: &str,
        round: u32,
        timeout_seconds: u64,
    ) -> (ConfirmationRecord, oneshot::Receiver<ConfirmationVerdict>) {
        let (tx, rx) = oneshot::channel();
        let now = Utc::now();
        let record = ConfirmationRecord {
            session_id: session_id.to_string(),
            status: ConfirmationStatus::Pending,
            created_at: now,
            expires_at: now + chrono::Duration::seconds(timeout_seconds as i64),
            round,
            response: None,
        };
        self.pending.lock().insert(
            session_id.to_string(),
            Pending {
                record: record.clone(),
                respond: tx,
            },
        );
        (record, rx)
    }

    /// Submit a verdict for a session's pending confirmation. Returns
    /// `false` if there was no pending confirmation for this session (a
    /// late or duplicate submission is a no-op, not an error).
    ///
    /// Modifying the plan increments the round so a subsequent
    /// confirmation request for the same session is distinguishable from
    /// the one it replaces.
    pub fn submit_confirmation(&self, session_id: &str, verdict: ConfirmationVerdict) -> bool {
        let Some(pending) = self.pending.lock().remove(session_id) else {
            return false;
        };
        let _ = pending.respond.send(verdict);
        true
    }

    /// Snapshot of the currently pending record for a session, if any.
    pub fn pending_for(&self, session_id: &str) -> Option<ConfirmationRecord> {
        self.pending.lock().get(session_id).map(|p| p.record.clone())
    }

    /// Drop a session's pending confirmation without resolving it (used
    /// when the engine gives up waiting itself, e.g. after a session is
    /// abandoned).
    pub fn cancel(&self, session_id: &str) {
        self.pending.lock().remove(session_id);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

/// Outcome of waiting on a confirmation: either a verdict arrived, or the
/// deadline elapsed first. Kept distinct from [`ConfirmationVerdict`]'s own
/// `Cancel` action so the engine can surface `ConfirmationTimeout` (§7) as
/// its own error category instead of folding it into a user cancel.
pub enum AwaitOutcome {
    Verdict(ConfirmationVerdict),
    TimedOut,
}

/// Wait for a session's confirmation with the record's own timeout.
///
/// A dropped sender (the coordinator's `cancel`, or a caller replacing the
/// request before this one was answered) resolves as an explicit cancel —
/// the engine never distinguishes "somebody replaced me" from "somebody
/// said no" at this layer. Only the deadline elapsing resolves as
/// [`AwaitOutcome::TimedOut`].
pub async fn await_confirmation(rx: oneshot::Receiver<ConfirmationVerdict>, timeout: Duration) -> AwaitOutcome {
    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(verdict)) => AwaitOutcome::Verdict(verdict),
        Ok(Err(_)) => AwaitOutcome::Verdict(ConfirmationVerdict {
            action: ConfirmationAction::Cancel,
            modified_tasks: None,
            free_text: None,
        }),
        Err(_) => AwaitOutcome::TimedOut,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn confirm_resolves_waiter() {
        let coord = ConfirmationCoordinator::new();
        let (record, rx) = coord.request_confirmation("s1", 0, 120);
        assert_eq!(record.status, ConfirmationStatus::Pending);

        assert!(coord.submit_confirmation(
            "s1",
            ConfirmationVerdict {
                action: ConfirmationAction::Confirm,
                modified_tasks: None,
                free_text: None,
            }
        ));

        let AwaitOutcome::Verdict(verdict) = await_confirmation(rx, Duration::from_secs(5)).await else {
            panic!("expected a verdict, not a timeout");
        };
        assert_eq!(verdict.action, ConfirmationAction::Confirm);
        assert_eq!(coord.pending_count(), 0);
    }

    #[tokio::test]
    async fn submit_for_unknown_session_is_noop() {
        let coord = ConfirmationCoordinator::new();
        assert!(!coord.submit_confirmation(
            "nope",
            ConfirmationVerdict {
                action: ConfirmationAction::Confirm,
                modified_tasks: None,
                free_text: None,
            }
        ));
    }

    #[tokio::test]
    async fn timeout_resolves_as_timed_out() {
        let coord = ConfirmationCoordinator::new();
        let (_record, rx) = coord.request_confirmation("s1", 0, 120);
        let outcome = await_confirmation(rx, Duration::from_millis(20)).await;
        assert!(matches!(outcome, AwaitOutcome::TimedOut));
    }

    #[tokio::test]
    async fn replacing_a_pending_request_cancels_the_old_waiter() {
        let coord = ConfirmationCoordinator::new();
        let (_first_record, first_rx) = coord.request_confirmation("s1", 0, 120);
        let (_second_record, _second_rx) = coord.request_confirmation("s1", 1, 120);

        let AwaitOutcome::Verdict(verdict) = await_confirmation(first_rx, Duration::from_secs(5)).await else {
            panic!("expected an explicit-cancel verdict, not a timeout");
        };
        assert_eq!(verdict.action, ConfirmationAction::Cancel);
    }

    #[test]
    fn pending_for_reflects_open_request() {
        let coord = ConfirmationCoordinator::new();
        assert!(coord.pending_for("s1").is_none());
        let (_record, _rx) = coord.request_confirmation("s1", 0, 60);
        assert!(coord.pending_for("s1").is_some());
        coord.cancel("s1");
        assert!(coord.pending_for("s1").is_none());
    }
}
