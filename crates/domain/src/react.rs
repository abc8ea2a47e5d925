//! Core data model for the ReAct engine: sessions, tasks, tool descriptors,
//! tool results, the engine's update stream, and confirmation records.
//!
//! These types are shared by every crate that sits on the F→H→E→G→I spine:
//! the planner builds [`Task`]s, the registry advertises [`ToolDescriptor`]s,
//! the engine drives [`Session`] through its [`SessionState`] machine and
//! emits [`Update`]s, and the confirmation coordinator mutates
//! [`ConfirmationRecord`]s.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Error categories
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Error kinds surfaced to users and tests. These are descriptive tags,
/// not the internal Rust error type — see [`crate::error::Error`] for that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    ConfigError,
    TransportError,
    ProtocolError,
    ToolNotFound,
    ServerNotFound,
    PlanningError,
    ToolExecutionError,
    Timeout,
    ConfirmationTimeout,
    Cancelled,
    ReplanCapExceeded,
    InternalError,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tasks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Coarse classification of what a task does; used for risk-surfacing in
/// confirmation summaries and for opt-in parallelism decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    File,
    Shell,
    Search,
    Network,
    Content,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Planned,
    Running,
    Succeeded,
    Failed,
}

/// One planned tool invocation. A DAG node in a [`Plan`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique within the owning plan.
    pub id: String,
    pub description: String,
    /// Namespaced (`server:tool`) or local tool name. Resolved against the
    /// registry at dispatch time — the planner never invents names.
    pub tool_name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
    #[serde(default)]
    pub expected_outcome: String,
    /// Higher runs first among otherwise-unordered candidates.
    #[serde(default)]
    pub priority: i32,
    /// Ids of tasks that must succeed before this one may be dispatched.
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default = "default_task_kind")]
    pub kind: TaskKind,
    #[serde(default = "default_task_status")]
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

fn default_task_kind() -> TaskKind {
    TaskKind::Other
}
fn default_task_status() -> TaskStatus {
    TaskStatus::Planned
}

impl Task {
    pub fn new(id: impl Into<String>, description: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            tool_name: tool_name.into(),
            arguments: serde_json::json!({}),
            expected_outcome: String::new(),
            priority: 0,
            dependencies: Vec::new(),
            kind: TaskKind::Other,
            status: TaskStatus::Planned,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// An ordered list of tasks produced by the planner for one user input.
/// Order is a valid topological order of the dependency DAG; ties among
/// equal-priority, equal-dependency-depth candidates keep insertion order.
pub type Plan = Vec<Task>;

/// Return `plan` tasks grouped into dependency levels (each level may run
/// concurrently; levels themselves are strictly ordered). Returns `Err`
/// with the offending task id if a cycle or missing dependency is found.
pub fn topological_levels(plan: &Plan) -> Result<Vec<Vec<String>>, String> {
    let index: HashMap<&str, &Task> = plan.iter().map(|t| (t.id.as_str(), t)).collect();
    for t in plan {
        for dep in &t.dependencies {
            if !index.contains_key(dep.as_str()) {
                return Err(format!("task '{}' depends on unknown task '{}'", t.id, dep));
            }
        }
    }

    let mut resolved: HashMap<&str, usize> = HashMap::new();
    let mut levels: Vec<Vec<String>> = Vec::new();
    let mut remaining: Vec<&Task> = plan.iter().collect();

    while !remaining.is_empty() {
        let (ready, pending): (Vec<&Task>, Vec<&Task>) = remaining.into_iter().partition(|t| {
            t.dependencies.iter().all(|d| resolved.contains_key(d.as_str()))
        });
        if ready.is_empty() {
            let stuck = pending.first().map(|t| t.id.clone()).unwrap_or_default();
            return Err(format!("dependency cycle detected at task '{stuck}'"));
        }
        let level_idx = levels.len();
        let mut level = Vec::with_capacity(ready.len());
        for t in &ready {
            resolved.insert(t.id.as_str(), level_idx);
            level.push(t.id.clone());
        }
        levels.push(level);
        remaining = pending;
    }
    Ok(levels)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool descriptors & results
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ToolCapabilities {
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub requires_network: bool,
    #[serde(default)]
    pub long_running: bool,
    #[serde(default)]
    pub progress_capable: bool,
}

/// Metadata discovered from a built-in or remote tool server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Fully resolved name (`server:tool` for remote, bare for built-in).
    pub name: String,
    pub description: String,
    /// Structural description of accepted arguments (JSON Schema-shaped).
    pub input_schema: serde_json::Value,
    /// `None` for built-in tools.
    #[serde(default)]
    pub server_id: Option<String>,
    #[serde(default)]
    pub capabilities: ToolCapabilities,
}

/// One unit produced by a tool call. The terminal variant (`Success` or
/// `Error`) ends the call; `Progress` may repeat any number of times first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolResult {
    Progress {
        step: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        progress_pct: Option<f32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<serde_json::Value>,
    },
    Success {
        payload: serde_json::Value,
        duration_ms: u64,
        server: Option<String>,
        tool: String,
    },
    Error {
        category: ErrorCategory,
        message: String,
        #[serde(default)]
        retryable: bool,
    },
}

impl ToolResult {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ToolResult::Progress { .. })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session state machine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Reasoning,
    Planning,
    AwaitingConfirmation,
    Executing,
    Evaluating,
    Replanning,
    Completed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed)
    }
}

/// One line in a session's append-only activity log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub from: SessionState,
    pub to: SessionState,
    pub note: String,
}

/// One conversation instance, owned exclusively by the engine while a
/// request is in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub state: SessionState,
    pub user_input: String,
    #[serde(default)]
    pub plan: Option<Plan>,
    /// Task id → terminal result.
    #[serde(default)]
    pub task_results: HashMap<String, ToolResult>,
    #[serde(default)]
    pub log: Vec<LogEntry>,
    #[serde(default)]
    pub replan_count: u32,
    pub max_replans: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: impl Into<String>, user_input: impl Into<String>, max_replans: u32) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            state: SessionState::Idle,
            user_input: user_input.into(),
            plan: None,
            task_results: HashMap::new(),
            log: Vec::new(),
            replan_count: 0,
            max_replans,
            created_at: now,
            updated_at: now,
        }
    }

    /// Transition to `to`, appending a log entry. Does not validate that
    /// `to` is reachable from the current state — callers (the engine) own
    /// that invariant.
    pub fn transition(&mut self, to: SessionState, note: impl Into<String>) {
        let entry = LogEntry {
            at: Utc::now(),
            from: self.state,
            to,
            note: note.into(),
        };
        self.log.push(entry);
        self.state = to;
        self.updated_at = Utc::now();
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Confirmation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationStatus {
    Pending,
    Confirmed,
    Modified,
    Cancelled,
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationAction {
    Confirm,
    Modify,
    Cancel,
}

/// The user's answer to a `confirmation_request`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationVerdict {
    pub action: ConfirmationAction,
    #[serde(default)]
    pub modified_tasks: Option<Plan>,
    #[serde(default)]
    pub free_text: Option<String>,
}

/// Coordinator-owned state for one session's pending (or resolved)
/// confirmation gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationRecord {
    pub session_id: String,
    pub status: ConfirmationStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub round: u32,
    #[serde(default)]
    pub response: Option<ConfirmationVerdict>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Update stream
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One item in the engine's output stream. Tagged union mirrored
/// verbatim into the HTTP adapter's `chunk_type` field (see
/// [`Update::chunk_type`]) and printed line-by-line by the CLI adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Update {
    StatusUpdate {
        text: String,
    },
    TaskPlan {
        tasks: Plan,
    },
    TaskInit {
        task_ids: Vec<String>,
    },
    ToolExecution {
        task_id: String,
        tool: String,
        args_summary: String,
    },
    ToolProgress {
        task_id: String,
        progress: ToolResult,
    },
    SubTaskResult {
        task_id: String,
        outcome_text: String,
    },
    ConfirmationRequest {
        session_id: String,
        tasks_summary: String,
        timeout_seconds: u64,
        round: u32,
    },
    ConfirmationReceived {
        action: ConfirmationAction,
    },
    ConversationalResponse {
        text: String,
    },
    FinalResult {
        text: String,
        metadata: serde_json::Value,
    },
    Error {
        category: ErrorCategory,
        text: String,
    },
}

impl Update {
    /// The `chunk_type` discriminator used by the HTTP streaming adapter.
    pub fn chunk_type(&self) -> &'static str {
        match self {
            Update::StatusUpdate { .. } => "status",
            Update::TaskPlan { .. } => "task_init",
            Update::TaskInit { .. } => "task_init",
            Update::ToolExecution { .. } => "tool_output",
            Update::ToolProgress { .. } => "mcp_progress",
            Update::SubTaskResult { .. } => "tool_output",
            Update::ConfirmationRequest { .. } => "confirmation_request",
            Update::ConfirmationReceived { .. } => "confirmation_received",
            Update::ConversationalResponse { .. } => "content",
            Update::FinalResult { .. } => "completion",
            Update::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Update::FinalResult { .. } | Update::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, deps: &[&str]) -> Task {
        let mut t = Task::new(id, "d", "local:noop");
        t.dependencies = deps.iter().map(|s| s.to_string()).collect();
        t
    }

    #[test]
    fn topo_levels_linear_chain() {
        let plan = vec![task("a", &[]), task("b", &["a"]), task("c", &["b"])];
        let levels = topological_levels(&plan).unwrap();
        assert_eq!(levels, vec![vec!["a".to_string()], vec!["b".to_string()], vec!["c".to_string()]]);
    }

    #[test]
    fn topo_levels_parallel_fanout() {
        let plan = vec![task("a", &[]), task("b", &[]), task("c", &["a", "b"])];
        let levels = topological_levels(&plan).unwrap();
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[0].len(), 2);
        assert_eq!(levels[1], vec!["c".to_string()]);
    }

    #[test]
    fn topo_levels_detects_missing_dependency() {
        let plan = vec![task("a", &["ghost"])];
        assert!(topological_levels(&plan).is_err());
    }

    #[test]
    fn topo_levels_detects_cycle() {
        let plan = vec![task("a", &["b"]), task("b", &["a"])];
        assert!(topological_levels(&plan).is_err());
    }

    #[test]
    fn session_transition_appends_log() {
        let mut s = Session::new("s1", "hello", 3);
        s.transition(SessionState::Reasoning, "classify");
        assert_eq!(s.log.len(), 1);
        assert_eq!(s.log[0].from, SessionState::Idle);
        assert_eq!(s.state, SessionState::Reasoning);
    }

    #[test]
    fn update_chunk_type_mapping() {
        assert_eq!(Update::StatusUpdate { text: "x".into() }.chunk_type(), "status");
        assert_eq!(
            Update::ConfirmationRequest {
                session_id: "s".into(),
                tasks_summary: "t".into(),
                timeout_seconds: 30,
                round: 1
            }
            .chunk_type(),
            "confirmation_request"
        );
    }
}
