//! AI-assisted decomposition: turns a user message plus the set of
//! available tool descriptors into either a conversational reply or a
//! candidate list of tasks, via a single structured-JSON model call.

use serde::Deserialize;
use serde_json::Value;

use parley_ai::{ChatRequest, LlmRouter};
use parley_domain::capability::ModelRole;
use parley_domain::error::{Error, Result};
use parley_domain::react::{Task, TaskKind, ToolDescriptor};
use parley_domain::tool::Message;

/// One task candidate as emitted by the model, before registry validation.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTask {
    pub id: String,
    pub description: String,
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Value,
    #[serde(default)]
    pub expected_outcome: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub kind: Option<String>,
}

impl RawTask {
    pub fn into_task(self) -> Task {
        let mut t = Task::new(self.id, self.description, self.tool_name);
        t.arguments = self.arguments;
        t.expected_outcome = self.expected_outcome;
        t.priority = self.priority;
        t.dependencies = self.dependencies;
        t.kind = parse_kind(self.kind.as_deref());
        t
    }
}

fn parse_kind(s: Option<&str>) -> TaskKind {
    match s.unwrap_or("other") {
        "file" => TaskKind::File,
        "shell" => TaskKind::Shell,
        "search" => TaskKind::Search,
        "network" => TaskKind::Network,
        "content" => TaskKind::Content,
        _ => TaskKind::Other,
    }
}

/// The model's raw response: either a conversational answer, or a set of
/// candidate tasks. Never both.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPlanResponse {
    pub mode: String,
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub tasks: Vec<RawTask>,
}

fn system_prompt(tools: &[ToolDescriptor], scope_hint: Option<&str>, retry_hint: Option<&str>) -> String {
    let tool_lines: String = tools
        .iter()
        .map(|t| format!("- {} — {}", t.name, t.description))
        .collect::<Vec<_>>()
        .join("\n");

    let mut prompt = format!(
        "You are the planning stage of a tool-using agent. Decide whether the \
         user's message requires invoking tools, or is purely conversational.\n\n\
         Available tools:\n{tool_lines}\n\n\
         Respond with a single JSON object, no prose outside it:\n\
         {{\"mode\": \"conversation\", \"response\": \"<reply text>\"}}\n\
         or\n\
         {{\"mode\": \"task\", \"tasks\": [{{\"id\": \"t1\", \"description\": \"...\", \
         \"tool_name\": \"<must be one of the tool names above>\", \"arguments\": {{}}, \
         \"expected_outcome\": \"...\", \"priority\": 0, \"dependencies\": [], \"kind\": \"other\"}}]}}\n\n\
         Every tool_name must be copied verbatim from the list above. Never invent a tool name.",
    );

    if let Some(hint) = scope_hint {
        prompt.push_str("\n\n");
        prompt.push_str(hint);
    }
    if let Some(hint) = retry_hint {
        prompt.push_str("\n\n");
        prompt.push_str(hint);
    }
    prompt
}

/// Ask the planner model to classify and, if needed, decompose `user_input`
/// into candidate tasks. `retry_hint`, when present, is appended to the
/// prompt to steer a retry after a prior tool-name validation failure.
pub async fn decompose(
    router: &LlmRouter,
    user_input: &str,
    tools: &[ToolDescriptor],
    context: &[Message],
    scope_hint: Option<&str>,
    retry_hint: Option<&str>,
) -> Result<RawPlanResponse> {
    let mut messages = vec![Message::system(&system_prompt(tools, scope_hint, retry_hint))];
    messages.extend_from_slice(context);
    messages.push(Message::user(user_input));

    let req = ChatRequest {
        messages,
        tools: Vec::new(),
        temperature: Some(0.1),
        max_tokens: None,
        json_mode: true,
        model: None,
    };

    let resp = router.chat_for_role(ModelRole::Planner, req).await?;
    parse_response(&resp.content)
}

fn parse_response(content: &str) -> Result<RawPlanResponse> {
    let trimmed = extract_json_object(content);
    serde_json::from_str(trimmed)
        .map_err(|e| Error::Other(format!("planner response was not valid JSON: {e}")))
}

/// Models occasionally wrap JSON in a code fence or surrounding prose; pull
/// out the outermost `{...}` span before parsing.
fn extract_json_object(content: &str) -> &str {
    let start = content.find('{');
    let end = content.rfind('}');
    match (start, end) {
        (Some(s), Some(e)) if e >= s => &content[s..=e],
        _ => content,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_json_from_code_fence() {
        let text = "```json\n{\"mode\": \"conversation\", \"response\": \"hi\"}\n```";
        let parsed = parse_response(text).unwrap();
        assert_eq!(parsed.mode, "conversation");
        assert_eq!(parsed.response.as_deref(), Some("hi"));
    }

    #[test]
    fn parses_task_mode() {
        let text = r#"{"mode": "task", "tasks": [
            {"id": "t1", "description": "read a file", "tool_name": "file_read",
             "arguments": {"file_path": "/tmp/a.txt"}, "dependencies": []}
        ]}"#;
        let parsed = parse_response(text).unwrap();
        assert_eq!(parsed.mode, "task");
        assert_eq!(parsed.tasks.len(), 1);
        assert_eq!(parsed.tasks[0].tool_name, "file_read");
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_response("not json at all").is_err());
    }
}
