use anyhow::Result;
use rustyline::error::ReadlineError;
use rustyline::{Config as RlConfig, DefaultEditor};
use std::sync::Arc;
use switchboard_core::config::AppConfig;
use switchboard_core::orchestrator::AgentOrchestrator;
use switchboard_core::types::InterfaceTag;

const BANNER: &str = r#"
  ╔═══════════════════════════════════════════╗
  ║               switchboard                 ║
  ║   An interface-agnostic agent orchestrator ║
  ╚═══════════════════════════════════════════╝

  Type your message and press Enter to chat.
  Commands:
    /tools     — List available tools
    /health    — Show orchestrator health
    /stats     — Show processing stats
    /clear     — Clear this chat's context
    /help      — Show this help
    /exit      — Quit
"#;

/// Run the interactive REPL. `chat_id` selects which conversation history
/// the orchestrator's Context Manager tracks; the REPL sends every line to
/// `AgentOrchestrator::process_message` with `InterfaceTag::Cli`.
pub async fn run(orchestrator: Arc<AgentOrchestrator>, chat_id: Option<String>) -> Result<()> {
    println!("{}", BANNER);

    let chat_id = chat_id.unwrap_or_else(|| "cli-default".to_string());
    println!("  Chat: {}\n", chat_id);

    let rl_config = RlConfig::builder().auto_add_history(true).build();
    let history_path = AppConfig::data_dir().join("repl_history.txt");
    let mut rl = DefaultEditor::with_config(rl_config)?;
    let _ = rl.load_history(&history_path);

    loop {
        let prompt = format!("\x1b[1;36m{}\x1b[0m \x1b[1;32m❯\x1b[0m ", chat_id);

        match rl.readline(&prompt) {
            Ok(line) => {
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }

                if input.starts_with('/') {
                    if !handle_command(input, &orchestrator, &chat_id).await? {
                        break;
                    }
                    continue;
                }

                let result = orchestrator
                    .process_message(&chat_id, input, InterfaceTag::Cli, None)
                    .await;

                if result.success {
                    println!("\x1b[1;33massistant\x1b[0m: {}", result.response);
                    if let Some(model) = &result.model_used {
                        println!("  \x1b[0;90m({} · {}ms)\x1b[0m", model, result.execution_time_ms);
                    }
                } else {
                    println!(
                        "\x1b[0;31merror\x1b[0m ({:?}): {}",
                        result.error_kind.unwrap_or(switchboard_core::types::ErrorKind::ServerError),
                        result.response
                    );
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(e) => {
                eprintln!("Input error: {}", e);
                break;
            }
        }
    }

    if let Some(parent) = history_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let _ = rl.save_history(&history_path);

    Ok(())
}

/// Handle a slash command. Returns `true` to continue the loop, `false` to exit.
async fn handle_command(input: &str, orchestrator: &Arc<AgentOrchestrator>, chat_id: &str) -> Result<bool> {
    let parts: Vec<&str> = input.splitn(2, ' ').collect();
    let cmd = parts[0];

    match cmd {
        "/exit" | "/quit" | "/q" => {
            println!("Goodbye!");
            return Ok(false);
        }
        "/tools" => {
            let descriptors = orchestrator.tool_registry().all();
            if descriptors.is_empty() {
                println!("  No tools registered.");
            } else {
                println!("  Available tools ({}):", descriptors.len());
                for d in descriptors {
                    let confirm = if d.requires_confirmation { " (requires confirmation)" } else { "" };
                    println!("    • {} — {}{}", d.name, d.description, confirm);
                }
            }
        }
        "/health" => {
            let report = orchestrator.health_check().await;
            println!("  Status: {:?}", report.status);
            println!("  Models registered: {}", report.models_registered);
            println!("  Tools registered: {}", report.tools_registered);
            println!("  Pending confirmations: {}", report.pending_confirmations);
            println!("  Tracked chats: {}", report.tracked_chats);
            for (backend_id, available) in &report.backend_availability {
                println!("    {} — {}", backend_id, if *available { "available" } else { "unavailable" });
            }
            for (backend_id, state) in &report.circuit_states {
                println!("    circuit[{}] — {}", backend_id, state);
            }
        }
        "/stats" => {
            let stats = orchestrator.get_stats();
            println!("  Messages processed: {}", stats.messages_processed);
            println!("  Tools executed: {}", stats.tools_executed);
            println!("  Errors: {}", stats.errors);
            println!("  Uptime: {}s", stats.uptime_secs);
        }
        "/clear" => {
            orchestrator.context_manager().clear(chat_id).await;
            println!("Cleared chat history for '{}'.", chat_id);
        }
        "/help" | "/?" => {
            println!("  /tools     — List available tools");
            println!("  /health    — Show orchestrator health");
            println!("  /stats     — Show processing stats");
            println!("  /clear     — Clear this chat's context");
            println!("  /help      — Show this help");
            println!("  /exit      — Quit");
        }
        _ => {
            println!("Unknown command: {}. Type /help for available commands.", cmd);
        }
    }

    Ok(true)
}
