mod config;

use clap::Parser as _;
use config::Config;
use downstream::client::create_hyper_client;
use downstream::{ChatEngine, EngineConfig, InMemoryStore, Role};
use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::{StreamExt, wrappers::WatchStream};
use tracing::info;

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let config = Config::parse();
    info!("Starting chat REPL against {}", config.endpoint);

    let engine_config = EngineConfig::builder()
        .endpoint(config.endpoint)
        .maybe_api_key(config.api_key)
        .maybe_model(config.model)
        .maybe_system_prompt(config.system_prompt)
        .owner(config.owner)
        .maybe_idle_timeout(config.idle_timeout_secs.map(Duration::from_secs))
        .maybe_history_window(config.history_window)
        .build();

    let store = Arc::new(InMemoryStore::new());
    let mut engine = ChatEngine::new(create_hyper_client(), store, engine_config);

    // Print assistant text incrementally as the message list snapshots
    // arrive. Content is append-only per stream, so the unprinted suffix is
    // exactly what is new.
    let updates = engine.subscribe();
    tokio::spawn(async move {
        let mut snapshots = WatchStream::new(updates);
        let mut current_id = String::new();
        let mut printed = 0usize;
        while let Some(messages) = snapshots.next().await {
            let Some(last) = messages.last().filter(|m| m.role == Role::Assistant) else {
                continue;
            };
            if last.id != current_id {
                current_id = last.id.clone();
                printed = 0;
            }
            if last.content.len() > printed {
                print!("{}", &last.content[printed..]);
                let _ = std::io::stdout().flush();
                printed = last.content.len();
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\n> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break; // EOF
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }
        if line == "/new" {
            engine.start_new();
            continue;
        }
        if let Err(e) = engine.send(line).await {
            eprintln!("Error: {e}");
        }
        println!();
    }

    Ok(())
}
