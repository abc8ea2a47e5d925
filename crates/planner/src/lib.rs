//! Planner (component F): turns one user message into either a topologically
//! ordered [`Plan`] or a decision that no tools are needed.
//!
//! Four steps, in order: fast-path classification (regex, no AI call),
//! scope detection (keyword elevation into a known task domain), AI-assisted
//! decomposition with bounded tool-name-retry, and argument normalization
//! against the registry's schema defaults. The planner never invents a tool
//! name — every task is validated against [`parley_registry::ToolRegistry`]
//! before it can appear in a returned plan.

mod classify;
mod decompose;
mod defaults;
mod scope;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parley_ai::LlmRouter;
use parley_domain::react::{topological_levels, Plan, Task};
use parley_domain::tool::Message;
use parley_registry::{normalize_arguments, Resolution, ToolRegistry};

pub use decompose::{RawPlanResponse, RawTask};

/// What the planner decided for one user input.
#[derive(Debug, Clone)]
pub enum PlannerOutput {
    /// No tools are required; emit this text directly as the final answer.
    Conversational(String),
    /// A topologically ordered, registry-validated plan ready to execute.
    Plan(Plan),
}

/// Planner-local failure. Callers (the engine) map this to
/// `ErrorCategory::PlanningError` when emitting an `Update::Error`.
#[derive(Debug)]
pub enum PlanError {
    /// The underlying LLM call failed (network, timeout, provider error).
    Llm(parley_domain::error::Error),
    /// Planning itself failed: empty plan, cap exceeded, unresolved tool
    /// name after retries, missing required argument, or a broken DAG.
    Planning(String),
}

impl fmt::Display for PlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanError::Llm(e) => write!(f, "planner LLM call failed: {e}"),
            PlanError::Planning(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for PlanError {}

impl From<parley_domain::error::Error> for PlanError {
    fn from(e: parley_domain::error::Error) -> Self {
        PlanError::Llm(e)
    }
}

/// Component F. Holds the handles it needs to classify, decompose, and
/// validate plans; carries no session state of its own.
pub struct Planner {
    router: Arc<LlmRouter>,
    registry: Arc<ToolRegistry>,
    max_tasks_per_plan: usize,
    retry_attempts: u32,
}

impl Planner {
    pub fn new(
        router: Arc<LlmRouter>,
        registry: Arc<ToolRegistry>,
        max_tasks_per_plan: usize,
        retry_attempts: u32,
    ) -> Self {
        Self {
            router,
            registry,
            max_tasks_per_plan,
            retry_attempts,
        }
    }

    /// Plan (or conversationally answer) one user input.
    ///
    /// `context` is prior conversation history to include in the prompt;
    /// `prior_notes`, when present, is an evaluator's replan note appended
    /// to steer the next decomposition attempt.
    pub async fn plan(
        &self,
        user_input: &str,
        context: &[Message],
        prior_notes: Option<&str>,
    ) -> Result<PlannerOutput, PlanError> {
        if prior_notes.is_none() {
            // Fast-path classification only applies to a fresh request, not
            // a replan — a replan always goes back through decomposition.
            if let Some(reply) = classify::fast_path(user_input) {
                return Ok(PlannerOutput::Conversational(reply.text.to_string()));
            }
        }

        let scope_hint = scope::detect(user_input).map(|s| s.hint().to_string());
        let tools = self.registry.list_all().await;

        let mut retry_hint = prior_notes.map(|n| format!("Prior evaluation note: {n}"));
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let raw = decompose::decompose(
                &self.router,
                user_input,
                &tools,
                context,
                scope_hint.as_deref(),
                retry_hint.as_deref(),
            )
            .await?;

            if raw.mode == "conversation" {
                return Ok(PlannerOutput::Conversational(raw.response.unwrap_or_default()));
            }

            if raw.tasks.is_empty() {
                return Err(PlanError::Planning(
                    "planner produced an empty task list".to_string(),
                ));
            }
            if raw.tasks.len() > self.max_tasks_per_plan {
                return Err(PlanError::Planning(format!(
                    "planner produced {} tasks, exceeding the cap of {}",
                    raw.tasks.len(),
                    self.max_tasks_per_plan
                )));
            }

            let mut unknown = Vec::new();
            let mut tasks = Vec::with_capacity(raw.tasks.len());

            for raw_task in raw.tasks {
                let tool_name = raw_task.tool_name.clone();
                let mut task = raw_task.into_task();

                match self.registry.resolve(&tool_name).await {
                    Resolution::Builtin(descriptor) | Resolution::Remote { descriptor, .. } => {
                        let mut args = normalize_arguments(&task.arguments);
                        let missing = defaults::apply_schema_defaults(&mut args, &descriptor.input_schema);
                        if !missing.is_empty() {
                            return Err(PlanError::Planning(format!(
                                "task '{}' is missing required argument(s): {}",
                                task.id,
                                missing.join(", ")
                            )));
                        }
                        task.arguments = args;
                        tasks.push(task);
                    }
                    Resolution::Ambiguous(candidates) => {
                        unknown.push(format!(
                            "'{tool_name}' is ambiguous across servers; use one of: {}",
                            candidates.join(", ")
                        ));
                    }
                    Resolution::NotFound { suggestion } => {
                        unknown.push(match suggestion {
                            Some(s) => format!("'{tool_name}' does not exist (did you mean '{s}'?)"),
                            None => format!("'{tool_name}' does not exist"),
                        });
                    }
                }
            }

            if !unknown.is_empty() {
                if attempt <= self.retry_attempts {
                    retry_hint = Some(format!(
                        "Your previous plan used unknown tool name(s): {}. Use only tool \
                         names copied verbatim from the list above.",
                        unknown.join("; ")
                    ));
                    continue;
                }
                return Err(PlanError::Planning(format!(
                    "planner could not resolve tool name(s) after {attempt} attempt(s): {}",
                    unknown.join("; ")
                )));
            }

            return Ok(PlannerOutput::Plan(order_topologically(tasks)?));
        }
    }
}

/// Validate the task DAG and flatten it into a single topologically valid
/// order. Within each dependency level, tasks are sorted by `priority`
/// descending (higher runs first); equal-priority siblings keep the stable
/// insertion order `topological_levels` handed back.
fn order_topologically(tasks: Vec<Task>) -> Result<Plan, PlanError> {
    let levels = topological_levels(&tasks).map_err(PlanError::Planning)?;
    let mut by_id: HashMap<String, Task> = tasks.into_iter().map(|t| (t.id.clone(), t)).collect();

    let mut ordered = Vec::with_capacity(by_id.len());
    for level in levels {
        let mut level_tasks: Vec<Task> = level
            .into_iter()
            .filter_map(|id| by_id.remove(&id))
            .collect();
        level_tasks.sort_by_key(|t| std::cmp::Reverse(t.priority));
        ordered.extend(level_tasks);
    }
    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_domain::react::TaskKind;

    fn task(id: &str, deps: &[&str]) -> Task {
        let mut t = Task::new(id, "d", "local:noop");
        t.dependencies = deps.iter().map(|s| s.to_string()).collect();
        t.kind = TaskKind::Other;
        t
    }

    #[test]
    fn orders_linear_chain() {
        let tasks = vec![task("b", &["a"]), task("a", &[])];
        let ordered = order_topologically(tasks).unwrap();
        assert_eq!(ordered[0].id, "a");
        assert_eq!(ordered[1].id, "b");
    }

    #[test]
    fn rejects_cycle() {
        let tasks = vec![task("a", &["b"]), task("b", &["a"])];
        assert!(order_topologically(tasks).is_err());
    }

    #[test]
    fn preserves_insertion_order_within_a_level() {
        let tasks = vec![task("x", &[]), task("y", &[]), task("z", &[])];
        let ordered = order_topologically(tasks).unwrap();
        assert_eq!(
            ordered.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(),
            vec!["x", "y", "z"]
        );
    }

    #[test]
    fn sorts_by_priority_within_a_level() {
        let mut low = task("low", &[]);
        low.priority = 0;
        let mut high = task("high", &[]);
        high.priority = 10;
        let mut mid = task("mid", &[]);
        mid.priority = 5;

        let ordered = order_topologically(vec![low, high, mid]).unwrap();
        assert_eq!(
            ordered.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(),
            vec!["high", "mid", "low"]
        );
    }

    #[test]
    fn equal_priority_keeps_insertion_order_across_levels() {
        let tasks = vec![
            task("a", &[]),
            task("b", &["a"]),
            task("c", &["a"]),
            task("d", &["a"]),
        ];
        let ordered = order_topologically(tasks).unwrap();
        assert_eq!(
            ordered.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(),
            vec!["a", "b", "c", "d"]
        );
    }
}
