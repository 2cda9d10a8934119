//! Chat command: one-shot or interactive REPL.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use xiaoclaw::agent::AgentLoop;
use xiaoclaw::config::Config;
use xiaoclaw::log_component;

/// Session used when `--session` is not given.
pub const DEFAULT_SESSION: &str = "cli:default";

/// User id CLI messages are attributed to.
const CLI_USER: &str = "cli";

pub(crate) async fn cmd_chat(
    config: Config,
    message: Option<String>,
    session: String,
    no_stream: bool,
) -> Result<()> {
    let stream = config.agent.streaming && !no_stream;
    let agent = AgentLoop::from_config(config)
        .await
        .with_context(|| "Failed to initialise agent")?;

    if !agent.has_provider().await {
        eprintln!("Warning: no LLM provider configured, running in offline mode.");
        eprintln!("Set OPENAI_API_KEY or add provider.api_key to {:?}", Config::path());
        eprintln!();
    }
    log_component!(info, "cli", "Chat started", stream = stream);

    if let Some(msg) = message {
        ask(&agent, &session, &msg, stream).await;
        return Ok(());
    }

    println!("xiaoclaw v{} (session {})", env!("CARGO_PKG_VERSION"), session);
    println!("Type your message and press Enter. /stats shows usage, /quit exits.");
    println!();

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        print!("> ");
        stdout.flush()?;

        let mut input = String::new();
        match stdin.lock().read_line(&mut input) {
            Ok(0) => {
                println!();
                break;
            }
            Ok(_) => {
                let input = input.trim();
                match input {
                    "" => continue,
                    "/quit" | "/exit" | "quit" | "exit" => {
                        println!("Goodbye!");
                        break;
                    }
                    "/stats" => {
                        println!("{}", agent.stats().summary());
                        println!();
                        continue;
                    }
                    "/tools" => {
                        println!("{}", agent.tool_names().await.join(", "));
                        println!();
                        continue;
                    }
                    _ => {}
                }
                println!();
                ask(&agent, &session, input, stream).await;
                println!();
            }
            Err(e) => {
                eprintln!("Error reading input: {}", e);
                break;
            }
        }
    }

    log_component!(info, "cli", "Chat finished");
    Ok(())
}

/// Send one message and print the reply, chunk by chunk when streaming.
async fn ask(agent: &AgentLoop, session: &str, text: &str, stream: bool) {
    if !stream {
        println!("{}", agent.process(session, CLI_USER, text).await);
        return;
    }

    let (tx, mut rx) = mpsc::channel::<String>(64);
    let printer = async move {
        let mut stdout = io::stdout();
        while let Some(chunk) = rx.recv().await {
            print!("{}", chunk);
            let _ = stdout.flush();
        }
        println!();
    };
    // The sender is dropped when processing ends, which ends the printer.
    tokio::join!(agent.process_stream(session, CLI_USER, text, tx), printer);
}
