//! ReAct engine (components G + I): drives one session through the
//! reason → plan → confirm → execute → evaluate state machine and emits a
//! stream of [`Update`]s as it goes.
//!
//! The driver owns no business logic of its own beyond the state machine —
//! planning is [`parley_planner::Planner`], tool dispatch is
//! [`parley_registry::ToolRegistry`], human gating is
//! [`parley_confirmation::ConfirmationCoordinator`], and every transition is
//! persisted through [`parley_sessions::SessionRepository`] before its
//! update reaches the caller.

mod evaluate;
mod execute;
mod present;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::warn;

use parley_ai::LlmRouter;
use parley_confirmation::{await_confirmation, AwaitOutcome, ConfirmationCoordinator};
use parley_domain::config::ReactConfig;
use parley_domain::react::{
    ConfirmationAction, ErrorCategory, Plan, Session, SessionState, TaskKind, ToolResult, Update,
};
use parley_planner::{Planner, PlannerOutput};
use parley_registry::ToolRegistry;
use parley_sessions::SessionRepository;

use execute::ExecOutcome;

/// Component G+I. Holds the handles it needs to run a session end to end;
/// carries no per-session state itself — that lives in [`Session`].
pub struct Engine {
    router: Arc<LlmRouter>,
    registry: Arc<ToolRegistry>,
    planner: Arc<Planner>,
    confirmation: Arc<ConfirmationCoordinator>,
    session_repo: Arc<SessionRepository>,
    config: ReactConfig,
}

enum ConfirmOutcome {
    Proceed(Plan),
    Cancelled,
    TimedOut,
    /// A `modify` verdict with no replacement task list — only (possibly)
    /// free-text guidance. The caller must return to Planning with `note`
    /// folded in and re-confirm the fresh plan starting at `next_round`.
    Replan { note: String, next_round: u32 },
}

impl Engine {
    pub fn new(
        router: Arc<LlmRouter>,
        registry: Arc<ToolRegistry>,
        planner: Arc<Planner>,
        confirmation: Arc<ConfirmationCoordinator>,
        session_repo: Arc<SessionRepository>,
        config: ReactConfig,
    ) -> Self {
        Self {
            router,
            registry,
            planner,
            confirmation,
            session_repo,
            config,
        }
    }

    /// Start (or resume) a session and stream its updates back. The
    /// returned channel closes once a terminal `Update` (`FinalResult` or
    /// `Error`) has been sent.
    pub fn run(self: Arc<Self>, session_id: impl Into<String>, user_input: impl Into<String>) -> mpsc::Receiver<Update> {
        let (tx, rx) = mpsc::channel(64);
        let session_id = session_id.into();
        let user_input = user_input.into();

        tokio::spawn(async move {
            let mut session = match self.session_repo.load(&session_id) {
                Ok(existing) => existing,
                Err(_) => Session::new(session_id, user_input, self.config.max_replans),
            };
            self.run_session(&mut session, &tx).await;
        });

        rx
    }

    fn persist(&self, session: &Session) {
        if let Err(e) = self.session_repo.save(session) {
            warn!(session_id = %session.id, error = %e, "failed to persist session state");
        }
    }

    /// The main state-machine loop: §4.9's Idle → Reasoning → Planning →
    /// AwaitingConfirmation → Executing → Evaluating → Replanning cycle,
    /// terminating in Completed or Failed.
    async fn run_session(&self, session: &mut Session, tx: &mpsc::Sender<Update>) {
        self.persist(session);
        let mut prior_notes: Option<String> = None;

        loop {
            session.transition(SessionState::Reasoning, "classifying input");
            self.persist(session);

            let planned = self.planner.plan(&session.user_input, &[], prior_notes.as_deref()).await;

            let output = match planned {
                Ok(output) => output,
                Err(e) => {
                    let text = e.to_string();
                    session.transition(SessionState::Failed, text.clone());
                    self.persist(session);
                    let _ = tx.send(Update::Error { category: ErrorCategory::PlanningError, text }).await;
                    return;
                }
            };

            let plan = match output {
                PlannerOutput::Conversational(text) => {
                    session.transition(SessionState::Completed, "conversational reply, no tools needed");
                    self.persist(session);
                    let _ = tx.send(Update::ConversationalResponse { text: text.clone() }).await;
                    let _ = tx.send(Update::FinalResult { text, metadata: serde_json::json!({}) }).await;
                    return;
                }
                PlannerOutput::Plan(plan) => plan,
            };

            // Planning -> AwaitingConfirmation cycle. A `modify` verdict that
            // carries only free-text guidance (no replacement task list)
            // returns `ConfirmOutcome::Replan`, which sends this back through
            // the planner with that guidance folded in and re-confirms the
            // fresh plan — §4.9 routes `modify ──► Planning (round+1)`.
            let mut round: u32 = 1;
            let confirmed_plan = loop {
                session.transition(SessionState::Planning, "plan produced");
                session.plan = Some(plan.clone());
                self.persist(session);
                let _ = tx.send(Update::TaskPlan { tasks: plan.clone() }).await;
                let _ = tx
                    .send(Update::TaskInit { task_ids: plan.iter().map(|t| t.id.clone()).collect() })
                    .await;

                match self.confirm_plan(session, plan.clone(), tx, round).await {
                    ConfirmOutcome::Proceed(confirmed) => break confirmed,
                    ConfirmOutcome::Cancelled => {
                        session.transition(SessionState::Failed, "cancelled during confirmation");
                        self.persist(session);
                        let _ = tx
                            .send(Update::Error { category: ErrorCategory::Cancelled, text: "session cancelled by user".to_string() })
                            .await;
                        return;
                    }
                    ConfirmOutcome::TimedOut => {
                        session.transition(SessionState::Failed, "confirmation timed out");
                        self.persist(session);
                        let _ = tx
                            .send(Update::Error {
                                category: ErrorCategory::ConfirmationTimeout,
                                text: "no confirmation response before the deadline".to_string(),
                            })
                            .await;
                        return;
                    }
                    ConfirmOutcome::Replan { note, next_round } => {
                        let _ = tx
                            .send(Update::StatusUpdate { text: format!("replanning after modification: {note}") })
                            .await;
                        let replanned = self.planner.plan(&session.user_input, &[], Some(&note)).await;
                        match replanned {
                            Ok(PlannerOutput::Plan(new_plan)) => {
                                plan = new_plan;
                                round = next_round;
                                continue;
                            }
                            Ok(PlannerOutput::Conversational(text)) => {
                                session.transition(SessionState::Completed, "conversational reply after modification");
                                self.persist(session);
                                let _ = tx.send(Update::ConversationalResponse { text: text.clone() }).await;
                                let _ = tx.send(Update::FinalResult { text, metadata: serde_json::json!({}) }).await;
                                return;
                            }
                            Err(e) => {
                                let text = e.to_string();
                                session.transition(SessionState::Failed, text.clone());
                                self.persist(session);
                                let _ = tx.send(Update::Error { category: ErrorCategory::PlanningError, text }).await;
                                return;
                            }
                        }
                    }
                }
            };
            session.plan = Some(confirmed_plan);

            session.transition(SessionState::Executing, "executing plan");
            self.persist(session);

            let outcome = execute::execute_plan(&self.router, &self.registry, session, tx, self.config.max_task_retries).await;
            self.persist(session);

            match outcome {
                ExecOutcome::AllSucceeded => {
                    session.transition(SessionState::Evaluating, "all tasks succeeded, summarizing");
                    self.persist(session);

                    let results: Vec<(String, ToolResult)> =
                        session.task_results.iter().map(|(id, result)| (id.clone(), result.clone())).collect();
                    let plan_ref = session.plan.clone().unwrap_or_default();
                    let text = evaluate::summarize_final(&self.router, &session.user_input, &plan_ref, &results).await;

                    session.transition(SessionState::Completed, "finished");
                    self.persist(session);
                    let _ = tx
                        .send(Update::FinalResult {
                            text,
                            metadata: serde_json::json!({ "replan_count": session.replan_count }),
                        })
                        .await;
                    return;
                }
                ExecOutcome::Replan { note } => {
                    if session.replan_count >= session.max_replans {
                        session.transition(SessionState::Failed, "replan cap exceeded");
                        self.persist(session);
                        let _ = tx
                            .send(Update::Error {
                                category: ErrorCategory::ReplanCapExceeded,
                                text: format!("replan cap ({}) exceeded", session.max_replans),
                            })
                            .await;
                        return;
                    }
                    session.replan_count += 1;
                    session.transition(SessionState::Replanning, note.clone());
                    self.persist(session);
                    let _ = tx.send(Update::StatusUpdate { text: format!("replanning: {note}") }).await;
                    prior_notes = Some(note);
                    continue;
                }
                ExecOutcome::Abort { category, message } => {
                    session.transition(SessionState::Failed, message.clone());
                    self.persist(session);
                    let _ = tx.send(Update::Error { category, text: message }).await;
                    return;
                }
            }
        }
    }

    /// Confirmation round loop (§4.7). Returns immediately with
    /// `ConfirmOutcome::Proceed` when confirmation is disabled, or when
    /// `auto_confirm_safe_tasks` is set and no task in the plan is flagged
    /// dangerous (a shell task, in this engine's reading of "dangerous").
    ///
    /// A `modify` verdict carrying a replacement task list re-enters the
    /// loop at the next round with the new plan, so the modified plan
    /// itself gets confirmed before anything runs; a `modify` carrying an
    /// empty task list is treated as a cancel. A `modify` carrying no
    /// replacement list at all (free-text guidance only, which is all the
    /// HTTP adapter can ever supply) returns `ConfirmOutcome::Replan` so the
    /// caller routes back through Planning instead of re-showing the same
    /// confirmation.
    async fn confirm_plan(
        &self,
        session: &mut Session,
        plan: Plan,
        tx: &mpsc::Sender<Update>,
        start_round: u32,
    ) -> ConfirmOutcome {
        if !self.config.confirm_by_human {
            return ConfirmOutcome::Proceed(plan);
        }
        if self.config.auto_confirm_safe_tasks && !plan.iter().any(|t| t.kind == TaskKind::Shell) {
            return ConfirmOutcome::Proceed(plan);
        }

        let mut plan = plan;
        let mut round: u32 = start_round;

        loop {
            session.transition(SessionState::AwaitingConfirmation, format!("awaiting confirmation, round {round}"));
            self.persist(session);

            let (_, verdict_rx) =
                self.confirmation
                    .request_confirmation(&session.id, round, self.config.confirmation_timeout_seconds);
            let _ = tx
                .send(Update::ConfirmationRequest {
                    session_id: session.id.clone(),
                    tasks_summary: present::summarize_tasks(&plan),
                    timeout_seconds: self.config.confirmation_timeout_seconds,
                    round,
                })
                .await;

            let outcome = await_confirmation(verdict_rx, Duration::from_secs(self.config.confirmation_timeout_seconds)).await;
            let verdict = match outcome {
                AwaitOutcome::Verdict(v) => v,
                AwaitOutcome::TimedOut => return ConfirmOutcome::TimedOut,
            };
            let _ = tx.send(Update::ConfirmationReceived { action: verdict.action }).await;

            match verdict.action {
                ConfirmationAction::Confirm => return ConfirmOutcome::Proceed(plan),
                ConfirmationAction::Cancel => return ConfirmOutcome::Cancelled,
                ConfirmationAction::Modify => {
                    if !self.config.allow_task_modification {
                        return ConfirmOutcome::Cancelled;
                    }
                    match verdict.modified_tasks {
                        Some(tasks) if tasks.is_empty() => return ConfirmOutcome::Cancelled,
                        Some(tasks) => {
                            plan = tasks;
                            round += 1;
                        }
                        None => {
                            let note = verdict
                                .free_text
                                .clone()
                                .unwrap_or_else(|| "user requested changes to the plan".to_string());
                            return ConfirmOutcome::Replan { note, next_round: round + 1 };
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_domain::react::Task;

    #[test]
    fn dangerous_classification_flags_shell_tasks() {
        let mut safe = Task::new("t1", "read a file", "file_read");
        safe.kind = TaskKind::File;
        let mut dangerous = Task::new("t2", "run a command", "shell_exec");
        dangerous.kind = TaskKind::Shell;

        let plan = vec![safe, dangerous];
        assert!(plan.iter().any(|t| t.kind == TaskKind::Shell));
    }
}
