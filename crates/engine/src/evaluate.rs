//! Evaluator (component G): decides what happens after a task's terminal
//! result, and what the engine reports once a whole plan finishes.
//!
//! Each decision first tries a short AI assessment; when no evaluator role
//! is configured (or the call fails), it falls back to the deterministic
//! rule the spec names explicitly: success iff the terminal item is
//! `Success`.

use std::sync::Arc;

use serde::Deserialize;

use parley_ai::{ChatRequest, LlmRouter};
use parley_domain::capability::ModelRole;
use parley_domain::react::{Plan, Task, ToolResult};
use parley_domain::tool::Message;

/// The four outcomes §4.8 names for a single task's evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskVerdict {
    Continue,
    RetrySame,
    Replan { note: String },
    Abort { reason: String },
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    verdict: String,
    #[serde(default)]
    note: String,
}

/// Evaluate one task's terminal result.
pub async fn evaluate_task(router: &LlmRouter, task: &Task, result: &ToolResult, retries_left: u32) -> TaskVerdict {
    if let Some(v) = ai_evaluate_task(router, task, result).await {
        return v;
    }
    deterministic_task_verdict(result, retries_left)
}

async fn ai_evaluate_task(router: &LlmRouter, task: &Task, result: &ToolResult) -> Option<TaskVerdict> {
    let prompt = format!(
        "Task '{}' (tool: {}) just finished. Expected outcome: {}. Actual result: {}.\n\n\
         Respond with a single JSON object: {{\"verdict\": \"continue\"|\"retry_same\"|\"replan\"|\"abort\", \"note\": \"<one line>\"}}",
        task.id,
        task.tool_name,
        task.expected_outcome,
        describe_result(result),
    );
    let req = ChatRequest {
        messages: vec![Message::user(prompt)],
        json_mode: true,
        ..Default::default()
    };
    let resp = router.chat_for_role(ModelRole::Evaluator, req).await.ok()?;
    parse_verdict(&resp.content)
}

fn describe_result(result: &ToolResult) -> String {
    match result {
        ToolResult::Success { payload, .. } => format!("success: {payload}"),
        ToolResult::Error { message, retryable, .. } => {
            format!("error ({}retryable): {message}", if *retryable { "" } else { "not " })
        }
        ToolResult::Progress { step, .. } => format!("still in progress at step '{step}'"),
    }
}

fn parse_verdict(content: &str) -> Option<TaskVerdict> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end < start {
        return None;
    }
    let raw: RawVerdict = serde_json::from_str(&content[start..=end]).ok()?;
    Some(match raw.verdict.as_str() {
        "continue" => TaskVerdict::Continue,
        "retry_same" => TaskVerdict::RetrySame,
        "replan" => TaskVerdict::Replan { note: raw.note },
        "abort" => TaskVerdict::Abort { reason: raw.note },
        _ => return None,
    })
}

/// The fallback named explicitly by the spec: success iff the terminal
/// item is `Success`; a retryable error retries while budget remains,
/// otherwise it aborts the session.
fn deterministic_task_verdict(result: &ToolResult, retries_left: u32) -> TaskVerdict {
    match result {
        ToolResult::Success { .. } => TaskVerdict::Continue,
        ToolResult::Error { retryable, message, .. } => {
            if *retryable && retries_left > 0 {
                TaskVerdict::RetrySame
            } else {
                TaskVerdict::Abort { reason: message.clone() }
            }
        }
        ToolResult::Progress { .. } => TaskVerdict::Continue,
    }
}

/// Overall evaluation (§4.8 step 6): produce the `final_result` text once
/// every task in the plan has succeeded.
pub async fn summarize_final(router: &Arc<LlmRouter>, user_input: &str, plan: &Plan, results: &[(String, ToolResult)]) -> String {
    if let Some(text) = ai_summarize_final(router, user_input, plan, results).await {
        return text;
    }
    deterministic_final_summary(plan, results)
}

async fn ai_summarize_final(router: &LlmRouter, user_input: &str, plan: &Plan, results: &[(String, ToolResult)]) -> Option<String> {
    let outcomes: String = plan
        .iter()
        .map(|t| {
            let outcome = results
                .iter()
                .find(|(id, _)| id == &t.id)
                .map(|(_, r)| describe_result(r))
                .unwrap_or_else(|| "no result recorded".to_string());
            format!("- {}: {}", t.description, outcome)
        })
        .collect::<Vec<_>>()
        .join("\n");

    let prompt = format!(
        "The user asked: \"{user_input}\".\n\nThe following tasks were executed:\n{outcomes}\n\n\
         Write a concise final answer to the user summarizing what was done and any results \
         they need to see. Plain text, no JSON."
    );
    let req = ChatRequest {
        messages: vec![Message::user(prompt)],
        ..Default::default()
    };
    let resp = router.chat_for_role(ModelRole::Summarizer, req).await.ok()?;
    if resp.content.trim().is_empty() {
        None
    } else {
        Some(resp.content)
    }
}

fn deterministic_final_summary(plan: &Plan, results: &[(String, ToolResult)]) -> String {
    plan.iter()
        .map(|t| {
            let outcome = results
                .iter()
                .find(|(id, _)| id == &t.id)
                .map(|(_, r)| super::present::outcome_text(r))
                .unwrap_or_else(|| "no result recorded".to_string());
            format!("{}: {}", t.description, outcome)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_continue_on_success() {
        let result = ToolResult::Success {
            payload: serde_json::json!("ok"),
            duration_ms: 1,
            server: None,
            tool: "t".into(),
        };
        assert_eq!(deterministic_task_verdict(&result, 2), TaskVerdict::Continue);
    }

    #[test]
    fn deterministic_retries_retryable_error_while_budget_remains() {
        let result = ToolResult::Error {
            category: parley_domain::react::ErrorCategory::ToolExecutionError,
            message: "transient".into(),
            retryable: true,
        };
        assert_eq!(deterministic_task_verdict(&result, 1), TaskVerdict::RetrySame);
    }

    #[test]
    fn deterministic_aborts_when_retries_exhausted() {
        let result = ToolResult::Error {
            category: parley_domain::react::ErrorCategory::ToolExecutionError,
            message: "still failing".into(),
            retryable: true,
        };
        assert!(matches!(deterministic_task_verdict(&result, 0), TaskVerdict::Abort { .. }));
    }

    #[test]
    fn deterministic_aborts_on_nonretryable_error() {
        let result = ToolResult::Error {
            category: parley_domain::react::ErrorCategory::ToolExecutionError,
            message: "fatal".into(),
            retryable: false,
        };
        assert!(matches!(deterministic_task_verdict(&result, 5), TaskVerdict::Abort { .. }));
    }

    #[test]
    fn parses_ai_verdict_json() {
        let v = parse_verdict(r#"{"verdict": "replan", "note": "need a different tool"}"#).unwrap();
        assert_eq!(v, TaskVerdict::Replan { note: "need a different tool".into() });
    }

    #[test]
    fn rejects_unknown_verdict_string() {
        assert!(parse_verdict(r#"{"verdict": "whatever"}"#).is_none());
    }
}
