use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ReAct engine configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactConfig {
    /// Gate planned-tasks execution on user confirmation.
    #[serde(default)]
    pub confirm_by_human: bool,
    /// How long to wait for a verdict before treating it as cancel.
    #[serde(default = "d_confirmation_timeout")]
    pub confirmation_timeout_seconds: u64,
    /// Permit the `modify` verdict; when false only confirm/cancel are accepted.
    #[serde(default = "d_true")]
    pub allow_task_modification: bool,
    /// Skip confirmation entirely when no planned task is flagged dangerous.
    #[serde(default)]
    pub auto_confirm_safe_tasks: bool,
    /// Hard cap on replanning rounds.
    #[serde(default = "d_max_replans")]
    pub max_replans: u32,
    /// Cap on tasks a single plan may contain.
    #[serde(default = "d_max_tasks")]
    pub max_tasks_per_plan: usize,
    /// Bound on planner tool-name retry attempts before `PlanningError`.
    #[serde(default = "d_planner_retries")]
    pub planner_retry_attempts: u32,
    /// Bound on same-task retries after an evaluator `retry_same` verdict.
    #[serde(default = "d_task_retries")]
    pub max_task_retries: u32,
}

impl Default for ReactConfig {
    fn default() -> Self {
        Self {
            confirm_by_human: false,
            confirmation_timeout_seconds: d_confirmation_timeout(),
            allow_task_modification: true,
            auto_confirm_safe_tasks: false,
            max_replans: d_max_replans(),
            max_tasks_per_plan: d_max_tasks(),
            planner_retry_attempts: d_planner_retries(),
            max_task_retries: d_task_retries(),
        }
    }
}

fn d_confirmation_timeout() -> u64 {
    120
}
fn d_true() -> bool {
    true
}
fn d_max_replans() -> u32 {
    3
}
fn d_max_tasks() -> usize {
    20
}
fn d_planner_retries() -> u32 {
    2
}
fn d_task_retries() -> u32 {
    2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = ReactConfig::default();
        assert!(!cfg.confirm_by_human);
        assert_eq!(cfg.max_replans, 3);
        assert!(cfg.allow_task_modification);
    }

    #[test]
    fn deserialize_partial_overrides() {
        let json = r#"{"confirm_by_human": true, "max_replans": 5}"#;
        let cfg: ReactConfig = serde_json::from_str(json).unwrap();
        assert!(cfg.confirm_by_human);
        assert_eq!(cfg.max_replans, 5);
        assert_eq!(cfg.confirmation_timeout_seconds, 120);
    }
}
