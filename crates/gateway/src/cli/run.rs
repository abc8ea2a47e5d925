//! `parley run` — one-shot execution command.
//!
//! Sends a single message to the agent, prints the resulting [`Update`]
//! stream, and exits. Useful for scripting, piping, and quick CLI checks.

use std::io::Write;
use std::sync::Arc;

use parley_domain::config::Config;
use parley_domain::react::{ConfirmationAction, ConfirmationVerdict, Update};

use crate::bootstrap;

/// Execute a single agent turn and print the response.
pub async fn run(config: Arc<Config>, message: String, session_id: String, _model: Option<String>, json_output: bool) -> anyhow::Result<()> {
    let state = bootstrap::build_app_state(config).await?;

    let mut rx = state.engine.clone().run(session_id.clone(), message);

    let mut exit_code: i32 = 0;
    let mut collected: Vec<Update> = Vec::new();

    while let Some(update) = rx.recv().await {
        if json_output {
            collected.push(update);
            continue;
        }

        match update {
            Update::StatusUpdate { text } => eprintln!("\x1b[2m{text}\x1b[0m"),
            Update::ToolExecution { task_id, tool, args_summary } => {
                eprintln!("\x1b[2m[{task_id}] running {tool}({args_summary})\x1b[0m");
            }
            Update::SubTaskResult { task_id, outcome_text } => {
                eprintln!("\x1b[2m[{task_id}] {outcome_text}\x1b[0m");
            }
            Update::ConfirmationRequest { session_id: sid, round, .. } => {
                // `run` is for non-interactive scripting — there is no
                // operator to ask, so a pending confirmation is cancelled
                // rather than hung indefinitely. Use `chat` or the HTTP
                // surface's CONFIRM_ACTION protocol for interactive runs.
                eprintln!("confirmation requested (round {round}) but `run` is non-interactive — cancelling");
                state.confirmation.submit_confirmation(
                    &sid,
                    ConfirmationVerdict { action: ConfirmationAction::Cancel, modified_tasks: None, free_text: None },
                );
            }
            Update::ConversationalResponse { text } | Update::FinalResult { text, .. } => {
                println!("{text}");
            }
            Update::Error { category, text } => {
                eprintln!("error ({category}): {text}");
                exit_code = 1;
            }
            _ => {}
        }
        std::io::stdout().flush().ok();
    }

    if json_output {
        let json = serde_json::to_string_pretty(&collected).map_err(|e| anyhow::anyhow!("serializing updates: {e}"))?;
        println!("{json}");
    }

    if exit_code != 0 {
        std::process::exit(exit_code);
    }

    Ok(())
}
