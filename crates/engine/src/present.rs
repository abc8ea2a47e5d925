//! Human-readable rendering helpers for updates: argument summaries, task
//! summaries, and tool-result outcome text. Kept separate from the driver
//! so the wording can evolve without touching state-machine logic.

use parley_domain::react::{Task, ToolResult};

const SUMMARY_MAX_CHARS: usize = 400;

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max).collect();
    out.push('…');
    out
}

/// A short, redacted rendering of a tool call's arguments for the
/// `tool_execution` update (never the full payload — arguments may contain
/// secrets or large blobs).
pub fn summarize_args(arguments: &serde_json::Value) -> String {
    truncate(&arguments.to_string(), 200)
}

/// A one-line-per-task summary shown to the human in a confirmation prompt.
pub fn summarize_tasks(tasks: &[Task]) -> String {
    tasks
        .iter()
        .enumerate()
        .map(|(i, t)| format!("{}. {} (tool: {})", i + 1, t.description, t.tool_name))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Outcome text for a `sub_task_result` update.
pub fn outcome_text(result: &ToolResult) -> String {
    match result {
        ToolResult::Success { payload, .. } => truncate(&payload.to_string(), SUMMARY_MAX_CHARS),
        ToolResult::Error { message, .. } => format!("error: {message}"),
        ToolResult::Progress { step, .. } => format!("in progress: {step}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn truncates_long_args() {
        let long = json!({"data": "x".repeat(1000)});
        let out = summarize_args(&long);
        assert!(out.chars().count() <= 201);
    }

    #[test]
    fn formats_task_summary() {
        let mut t = Task::new("t1", "read a file", "file_read");
        t.arguments = json!({});
        let summary = summarize_tasks(&[t]);
        assert!(summary.contains("read a file"));
        assert!(summary.contains("file_read"));
    }
}
