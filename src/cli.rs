use anyhow::{Context, Result};
use std::sync::Arc;

use reedline::{DefaultCompleter, DefaultHinter, DefaultPrompt, Reedline, Signal};
use tokio_util::sync::CancellationToken;

use crate::agent::{Collaborators, SessionManager, SessionRegistry};
use crate::config::{self, Config};
use crate::error::AgentError;
use crate::types::Command;

const EXAMPLES: &[(&str, &[&str])] = &[
    ("🔗 Navigation", &["Go to wikipedia.org/wiki/computer_vision"]),
    ("🖱️ Interaction", &["Click on 'Object Detection' and take a screenshot"]),
    ("📋 Multi-step Tasks", &["Navigate, scroll, and summarize the wiki page"]),
];

const SECRETS_TEMPLATE: &str = "# API keys for webagent. Environment variables take precedence.\n# OPENAI_API_KEY = \"sk-...\"\n";

fn print_help() {
    println!("🌐 webagent - natural-language browser automation");
    println!();
    println!("Usage: webagent [command]");
    println!();
    println!("Commands:");
    println!("  agent           interactive mode (default)");
    println!("  onboard         write the default configuration");
    println!("  help            show this help");
    println!();
    print_repl_help();
    println!("Configuration: {}", Config::default_path().display());
}

fn print_repl_help() {
    println!("Interactive commands:");
    println!("  /help              show this help");
    println!("  /examples          example instructions");
    println!("  /tools             list the agent's tools");
    println!("  /new               start a new session");
    println!("  /sessions          list sessions");
    println!("  /switch <id>       switch to a session (id prefix is enough)");
    println!("  /close             close this session and its browser");
    println!("  /reset             reconnect the browser on next command");
    println!("  /clear             forget the conversation history");
    println!("  /quit              exit");
    println!();
}

fn print_examples() {
    println!("💡 Try These Commands");
    for (group, commands) in EXAMPLES {
        println!();
        println!("{}", group);
        for command in *commands {
            println!("  - {}", command);
        }
    }
    println!();
    println!("⚙️ Powered by Puppeteer + LLM");
    println!();
}

fn run_onboard() -> Result<()> {
    println!("🚀 Setting up webagent...\n");

    let home = config::home();
    std::fs::create_dir_all(&home)
        .with_context(|| format!("failed to create {}", home.display()))?;

    let config_path = Config::default_path();
    if config_path.exists() {
        println!("✔️  Keeping existing config: {}", config_path.display());
    } else {
        Config::default()
            .save(&config_path)
            .context("failed to save configuration")?;
        println!("✅ Wrote config: {}", config_path.display());
    }

    let secrets_path = home.join("secrets.toml");
    if secrets_path.exists() {
        println!("✔️  Keeping existing secrets: {}", secrets_path.display());
    } else {
        std::fs::write(&secrets_path, SECRETS_TEMPLATE)
            .with_context(|| format!("failed to write {}", secrets_path.display()))?;
        println!("✅ Wrote secrets template: {}", secrets_path.display());
    }

    println!();
    println!("🎉 Done!");
    println!();
    println!("Next:");
    println!("  1. Set OPENAI_API_KEY or fill in {}", secrets_path.display());
    println!("  2. Run 'webagent agent' and tell it what to do");

    Ok(())
}

/// Runs one command, cancelling it on Ctrl-C
async fn run_command(session: &SessionManager, command: &Command) -> Result<String, AgentError> {
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let result = session.submit_with_cancel(command.as_str(), &cancel).await;
    watcher.abort();
    result
}

async fn list_sessions(registry: &SessionRegistry, current: &SessionManager) {
    let sessions = registry.list().await;
    println!("📋 Sessions:");
    println!();
    for session in sessions {
        let metadata = session.metadata();
        let marker = if session.id() == current.id() { "*" } else { " " };
        let last_used = metadata
            .last_used
            .map(|t| t.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{} {} [{}] created {} | last used {} | commands {}",
            marker,
            session.short_id(),
            session.phase(),
            metadata.created_at.format("%Y-%m-%d %H:%M"),
            last_used,
            metadata.submissions
        );
    }
    println!();
}

/// Shut `current` down and pick the session to continue in: the newest
/// remaining one, or a fresh one
async fn close_session(registry: &SessionRegistry, current: &SessionManager) -> Arc<SessionManager> {
    registry.remove(current.id()).await;
    match registry.list().await.pop() {
        Some(latest) => latest,
        None => registry.create().await,
    }
}

async fn run_agent() -> Result<()> {
    let config = Config::load_default()?;

    println!("🌐 webagent");
    println!("🤖 Model: {} ({})", config.llm.model, config.llm.base_url);
    println!("🧰 Servers: {}", config.agent.server_names.join(", "));
    println!("Type /help for commands, /examples for ideas.\n");

    let collaborators = Collaborators::from_config(&config);
    let registry = SessionRegistry::new(config, collaborators);
    let mut session: Arc<SessionManager> = registry.create().await;
    println!("📝 Session: {}\n", session.short_id());

    let completer = DefaultCompleter::default();
    let hinter = DefaultHinter::default();
    let prompt = DefaultPrompt::default();

    let mut line_editor = Reedline::create()
        .with_hinter(Box::new(hinter))
        .with_completer(Box::new(completer));

    loop {
        let sig = line_editor.read_line(&prompt)?;

        match sig {
            Signal::Success(buffer) => {
                let input = buffer.trim();

                if input.starts_with('/') {
                    let parts: Vec<&str> = input.split_whitespace().collect();
                    let cmd = parts.first().map(|s| s.to_lowercase()).unwrap_or_default();

                    match cmd.as_str() {
                        "/quit" | "/exit" => {
                            println!("👋 Bye!");
                            break;
                        }
                        "/help" | "/h" => print_repl_help(),
                        "/examples" => print_examples(),
                        "/tools" => match session.list_tools().await {
                            Ok(tools) => {
                                println!("🧰 Tools:");
                                for tool in tools {
                                    println!(
                                        "  {}/{} - {}",
                                        tool.server,
                                        tool.name,
                                        tool.description.as_deref().unwrap_or("")
                                    );
                                }
                                println!();
                            }
                            Err(e) => println!("{}\n", e.user_message()),
                        },
                        "/new" => {
                            session = registry.create().await;
                            println!("✅ New session: {}\n", session.short_id());
                        }
                        "/close" => {
                            let closed = session.short_id().to_string();
                            session = close_session(&registry, &session).await;
                            println!("✅ Closed {}; now in session {}\n", closed, session.short_id());
                        }
                        "/sessions" => list_sessions(&registry, &session).await,
                        "/switch" => match parts.get(1) {
                            Some(prefix) => match registry.find(prefix).await {
                                Some(found) => {
                                    session = found;
                                    println!("✅ Switched to session {}\n", session.short_id());
                                }
                                None => println!("❌ No unique session matches '{}'\n", prefix),
                            },
                            None => println!("Usage: /switch <id>\n"),
                        },
                        "/reset" => {
                            session.reset().await;
                            println!("✅ Session reset; the browser reconnects on the next command\n");
                        }
                        "/clear" => {
                            session.clear_history().await;
                            println!("✅ Conversation history cleared\n");
                        }
                        _ => {
                            println!("❌ Unknown command: {}", input);
                            println!("Type /help for commands\n");
                        }
                    }
                    continue;
                }

                let Some(command) = Command::parse(input) else {
                    continue;
                };

                println!("⏳ Running your web agent...");
                match run_command(&session, &command).await {
                    Ok(reply) => {
                        println!();
                        println!("## 📬 Response");
                        println!();
                        println!("{}\n", reply);
                    }
                    Err(e) => println!("{}\n", e.user_message()),
                }
            }
            Signal::CtrlD => {
                println!("\n👋 Bye!");
                break;
            }
            Signal::CtrlC => {
                println!("\nType /quit to exit, or enter an instruction");
            }
        }
    }

    registry.shutdown_all().await;
    Ok(())
}

pub async fn run_cli() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    let command = args
        .get(1)
        .map(|s| s.to_lowercase())
        .unwrap_or_else(|| "agent".to_string());

    match command.as_str() {
        "agent" | "a" => run_agent().await,
        "onboard" => run_onboard(),
        "help" | "-h" | "--help" | "h" => {
            print_help();
            Ok(())
        }
        _ => {
            eprintln!("❌ Unknown command: {}", command);
            eprintln!();
            eprintln!("Run 'webagent help' for usage");
            std::process::exit(1);
        }
    }
}
