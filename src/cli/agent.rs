//! Agent command handler (interactive + single message).

use std::io::{self, BufRead, Write};

use anyhow::Result;
use tokio::sync::mpsc;

use muli::agent::{AgentEvent, AgentLoop};
use muli::config::Config;

use super::common::{create_agent, shutdown};

/// Interactive or single-message agent mode.
pub(crate) async fn cmd_agent(config: Config, message: Option<String>) -> Result<()> {
    if config.providers.api_key.is_none() {
        eprintln!("Warning: No API key configured. Set MULI_PROVIDERS_API_KEY");
        eprintln!("or add providers.api_key to {:?}", Config::path());
        eprintln!();
    }

    let (agent, container) = create_agent(&config).await?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut agent = agent.with_events(tx);

    let outcome = if let Some(msg) = message {
        // Single message mode
        match turn(&mut agent, &mut rx, &msg, print_event).await {
            Ok(response) => {
                println!("{}", response);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    } else {
        interactive(&mut agent, &mut rx).await
    };

    shutdown(&container).await;
    outcome
}

/// Run one turn, printing progress events as they arrive. Every event the
/// turn emitted is printed before the answer is returned.
async fn turn(
    agent: &mut AgentLoop,
    rx: &mut mpsc::UnboundedReceiver<AgentEvent>,
    input: &str,
    mut on_event: impl FnMut(AgentEvent),
) -> muli::Result<String> {
    let process = agent.process(input);
    tokio::pin!(process);
    loop {
        tokio::select! {
            result = &mut process => {
                while let Ok(event) = rx.try_recv() {
                    on_event(event);
                }
                return result;
            }
            Some(event) = rx.recv() => on_event(event),
        }
    }
}

async fn interactive(
    agent: &mut AgentLoop,
    rx: &mut mpsc::UnboundedReceiver<AgentEvent>,
) -> Result<()> {
    println!("muli interactive agent");
    println!("Type your message and press Enter. Type 'quit' or 'exit' to stop.");
    println!();

    let mut stdout = io::stdout();
    loop {
        print!("> ");
        stdout.flush()?;

        let mut input = String::new();
        let read = tokio::task::block_in_place(|| io::stdin().lock().read_line(&mut input));
        match read {
            Ok(0) => {
                // EOF
                println!();
                break;
            }
            Ok(_) => {
                let input = input.trim();
                if input.is_empty() {
                    continue;
                }
                if input == "quit" || input == "exit" {
                    println!("Goodbye!");
                    break;
                }

                match turn(agent, rx, input, print_event).await {
                    Ok(response) => {
                        println!();
                        println!("{}", response);
                        println!();
                    }
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        eprintln!();
                    }
                }
            }
            Err(e) => {
                eprintln!("Error reading input: {}", e);
                break;
            }
        }
    }
    Ok(())
}

fn print_event(event: AgentEvent) {
    match event {
        AgentEvent::Commentary(text) => println!("\n{}", text),
        AgentEvent::ToolCall { name, arguments } => println!("  -> {}({})", name, arguments),
        AgentEvent::ToolResult { name, preview } => println!("  <- {}: {}", name, preview),
    }
}
