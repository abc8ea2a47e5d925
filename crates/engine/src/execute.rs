//! Per-task execution loop: runs one task at a time, in plan order, against
//! the tool registry, feeding every terminal and non-terminal result through
//! the evaluator before moving on.
//!
//! Deliberately sequential — nothing here dispatches a dependency level
//! concurrently. The plan's topological order already guarantees a task's
//! dependencies ran first; running same-level tasks in parallel is a valid
//! future optimization the current config has no knob for.

use chrono::Utc;
use tokio::sync::mpsc;

use parley_ai::LlmRouter;
use parley_domain::react::{ErrorCategory, Session, Task, TaskStatus, ToolResult, Update};
use parley_registry::ToolRegistry;

use crate::evaluate::{evaluate_task, TaskVerdict};
use crate::present;

/// What happened after running every task in the plan, or as far as it got.
pub enum ExecOutcome {
    AllSucceeded,
    Replan { note: String },
    Abort { category: ErrorCategory, message: String },
}

enum TaskOutcome {
    Continue,
    Replan(String),
    Abort(ErrorCategory, String),
}

pub async fn execute_plan(
    router: &LlmRouter,
    registry: &ToolRegistry,
    session: &mut Session,
    tx: &mpsc::Sender<Update>,
    max_task_retries: u32,
) -> ExecOutcome {
    let tasks: Vec<Task> = session.plan.clone().unwrap_or_default();

    for task in &tasks {
        set_task_status(session, &task.id, TaskStatus::Running);

        match run_task(router, registry, session, task, tx, max_task_retries).await {
            TaskOutcome::Continue => {
                set_task_status(session, &task.id, TaskStatus::Succeeded);
            }
            TaskOutcome::Replan(note) => {
                set_task_status(session, &task.id, TaskStatus::Failed);
                return ExecOutcome::Replan { note };
            }
            TaskOutcome::Abort(category, message) => {
                set_task_status(session, &task.id, TaskStatus::Failed);
                return ExecOutcome::Abort { category, message };
            }
        }
    }

    ExecOutcome::AllSucceeded
}

async fn run_task(
    router: &LlmRouter,
    registry: &ToolRegistry,
    session: &mut Session,
    task: &Task,
    tx: &mpsc::Sender<Update>,
    max_task_retries: u32,
) -> TaskOutcome {
    for dep in &task.dependencies {
        let dep_succeeded = matches!(session.task_results.get(dep), Some(ToolResult::Success { .. }));
        if !dep_succeeded {
            let result = ToolResult::Error {
                category: ErrorCategory::ToolExecutionError,
                message: format!("dependency '{dep}' did not succeed"),
                retryable: false,
            };
            let outcome = present::outcome_text(&result);
            session.task_results.insert(task.id.clone(), result);
            let _ = tx
                .send(Update::SubTaskResult { task_id: task.id.clone(), outcome_text: outcome })
                .await;
            return TaskOutcome::Abort(
                ErrorCategory::ToolExecutionError,
                format!("task '{}' skipped: dependency '{dep}' did not succeed", task.id),
            );
        }
    }

    let mut attempt: u32 = 0;
    loop {
        let _ = tx
            .send(Update::ToolExecution {
                task_id: task.id.clone(),
                tool: task.tool_name.clone(),
                args_summary: present::summarize_args(&task.arguments),
            })
            .await;

        let mut rx = registry.call_async(&task.tool_name, task.arguments.clone()).await;
        let mut terminal: Option<ToolResult> = None;
        while let Some(item) = rx.recv().await {
            if item.is_terminal() {
                terminal = Some(item);
                break;
            }
            let _ = tx
                .send(Update::ToolProgress { task_id: task.id.clone(), progress: item })
                .await;
        }
        let result = terminal.unwrap_or(ToolResult::Error {
            category: ErrorCategory::InternalError,
            message: "tool call closed without a terminal result".to_string(),
            retryable: false,
        });

        let _ = tx
            .send(Update::SubTaskResult { task_id: task.id.clone(), outcome_text: present::outcome_text(&result) })
            .await;

        let retries_left = max_task_retries.saturating_sub(attempt);
        let verdict = evaluate_task(router, task, &result, retries_left).await;
        session.task_results.insert(task.id.clone(), result);

        match verdict {
            TaskVerdict::Continue => return TaskOutcome::Continue,
            TaskVerdict::RetrySame => {
                if attempt < max_task_retries {
                    attempt += 1;
                    continue;
                }
                return TaskOutcome::Abort(
                    ErrorCategory::ToolExecutionError,
                    format!("task '{}' exhausted its retry budget", task.id),
                );
            }
            TaskVerdict::Replan { note } => return TaskOutcome::Replan(note),
            TaskVerdict::Abort { reason } => return TaskOutcome::Abort(ErrorCategory::ToolExecutionError, reason),
        }
    }
}

fn set_task_status(session: &mut Session, task_id: &str, status: TaskStatus) {
    let Some(plan) = session.plan.as_mut() else { return };
    let Some(task) = plan.iter_mut().find(|t| t.id == task_id) else { return };
    task.status = status;
    if matches!(status, TaskStatus::Succeeded | TaskStatus::Failed) {
        task.completed_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_task_status_updates_completed_at_on_terminal_status() {
        let mut session = Session::new("s1", "do x", 3);
        let task = Task::new("t1", "d", "local:noop");
        session.plan = Some(vec![task]);

        set_task_status(&mut session, "t1", TaskStatus::Succeeded);

        let stored = &session.plan.as_ref().unwrap()[0];
        assert_eq!(stored.status, TaskStatus::Succeeded);
        assert!(stored.completed_at.is_some());
    }

    #[test]
    fn set_task_status_leaves_running_without_completed_at() {
        let mut session = Session::new("s1", "do x", 3);
        session.plan = Some(vec![Task::new("t1", "d", "local:noop")]);

        set_task_status(&mut session, "t1", TaskStatus::Running);

        let stored = &session.plan.as_ref().unwrap()[0];
        assert_eq!(stored.status, TaskStatus::Running);
        assert!(stored.completed_at.is_none());
    }
}
