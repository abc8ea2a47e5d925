//! `parley chat` — interactive REPL command.
//!
//! Opens a readline-based loop that sends each line to the agent and
//! prints the resulting [`Update`] stream. Supports slash-commands for
//! session management and model switching.

use std::io::Write;
use std::sync::Arc;

use parley_domain::config::Config;
use parley_domain::react::{ConfirmationAction, ConfirmationVerdict, ErrorCategory, Update};

use crate::bootstrap;

pub async fn run(config: Arc<Config>) -> anyhow::Result<()> {
    let state = bootstrap::build_app_state(config).await?;

    let mut session_id = "cli:chat".to_string();

    let history_path = dirs::home_dir().unwrap_or_default().join(".parley").join("chat_history.txt");
    if let Some(parent) = history_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let mut rl = rustyline::DefaultEditor::new()?;
    let _ = rl.load_history(&history_path);

    eprintln!("parley interactive chat");
    eprintln!("Session: {session_id}  |  Type /help for commands, Ctrl+D to exit");
    eprintln!();

    loop {
        let readline = rl.readline("you> ");

        match readline {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                rl.add_history_entry(&line).ok();

                if trimmed.starts_with('/') {
                    if handle_slash_command(trimmed, &mut session_id) {
                        break;
                    }
                    continue;
                }

                if let Err(e) = send_message(&state, &session_id, trimmed, &mut rl).await {
                    eprintln!("\x1B[31merror: {e}\x1B[0m");
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                eprintln!("(Use Ctrl+D or /exit to quit)");
                continue;
            }
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("\x1B[31mreadline error: {e}\x1B[0m");
                break;
            }
        }
    }

    rl.save_history(&history_path).ok();
    eprintln!("Goodbye!");
    Ok(())
}

/// Process a slash command. Returns `true` if the REPL should exit.
fn handle_slash_command(input: &str, session_id: &mut String) -> bool {
    let parts: Vec<&str> = input.splitn(2, ' ').collect();
    let cmd = parts[0];
    let arg = parts.get(1).map(|s| s.trim());

    match cmd {
        "/exit" | "/quit" => return true,
        "/session" => {
            if let Some(name) = arg.filter(|s| !s.is_empty()) {
                *session_id = name.to_string();
                eprintln!("Session switched to: {session_id}");
            } else {
                eprintln!("Current session: {session_id}");
                eprintln!("Usage: /session <id>");
            }
        }
        "/clear" => eprint!("\x1B[2J\x1B[1;1H"),
        "/reset" => {
            let ts = chrono::Utc::now().timestamp();
            *session_id = format!("{session_id}:{ts}");
            eprintln!("Session reset. New session id: {session_id}");
        }
        "/help" => {
            eprintln!("Commands:");
            eprintln!("  /session <id>   Switch to a named session");
            eprintln!("  /clear          Clear the screen");
            eprintln!("  /reset          Start a fresh session (new id)");
            eprintln!("  /exit, /quit    Exit the chat");
            eprintln!("  /help           Show this help");
        }
        other => eprintln!("Unknown command: {other}  (type /help for a list)"),
    }

    false
}

/// Run one turn, printing every [`Update`] as it arrives and prompting
/// inline when the engine opens a confirmation gate.
async fn send_message(
    state: &crate::state::AppState,
    session_id: &str,
    user_message: &str,
    rl: &mut rustyline::DefaultEditor,
) -> anyhow::Result<()> {
    let mut rx = state.engine.clone().run(session_id.to_string(), user_message.to_string());

    while let Some(update) = rx.recv().await {
        match update {
            Update::StatusUpdate { text } => eprintln!("\x1B[2m{text}\x1B[0m"),
            Update::TaskPlan { tasks } => {
                eprintln!("\x1B[2mplan: {} task(s)\x1B[0m", tasks.len());
            }
            Update::ToolExecution { task_id, tool, args_summary } => {
                eprintln!("\x1B[2m[{task_id}] running {tool}({args_summary})\x1B[0m");
            }
            Update::ToolProgress { task_id, progress } => {
                eprintln!("\x1B[2m[{task_id}] {progress:?}\x1B[0m");
            }
            Update::SubTaskResult { task_id, outcome_text } => {
                eprintln!("\x1B[2m[{task_id}] {outcome_text}\x1B[0m");
            }
            Update::ConfirmationRequest { session_id: sid, tasks_summary, round, .. } => {
                eprintln!("\nConfirm plan (round {round}):\n{tasks_summary}");
                let verdict = prompt_confirmation(rl)?;
                state.confirmation.submit_confirmation(&sid, verdict);
            }
            Update::ConfirmationReceived { .. } => {}
            Update::ConversationalResponse { text } => {
                println!("{text}\n");
            }
            Update::FinalResult { text, .. } => {
                println!("{text}\n");
            }
            Update::Error { category, text } => {
                eprintln!("\x1B[31merror ({category}): {text}\x1B[0m");
            }
            Update::TaskInit { .. } => {}
        }
        std::io::stdout().flush().ok();
    }

    Ok(())
}

fn prompt_confirmation(rl: &mut rustyline::DefaultEditor) -> anyhow::Result<ConfirmationVerdict> {
    loop {
        let line = rl.readline("confirm [y/n]> ")?;
        match line.trim() {
            "y" | "yes" => {
                return Ok(ConfirmationVerdict { action: ConfirmationAction::Confirm, modified_tasks: None, free_text: None })
            }
            "n" | "no" => {
                return Ok(ConfirmationVerdict { action: ConfirmationAction::Cancel, modified_tasks: None, free_text: None })
            }
            other if !other.is_empty() => {
                return Ok(ConfirmationVerdict {
                    action: ConfirmationAction::Modify,
                    modified_tasks: None,
                    free_text: Some(other.to_string()),
                })
            }
            _ => continue,
        }
    }
}

