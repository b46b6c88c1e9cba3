use std::sync::Arc;

use clap::Parser;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use covault::session::{ErrorReport, EventSink};

mod cli;
mod dispatch;

use cli::Cli;
use dispatch::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("covault=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    tokio::fs::create_dir_all(&cli.data_dir).await?;

    let (sink, mut events) = EventSink::channel();
    let state = Arc::new(AppState::new(cli.data_dir, sink));

    // Progress/terminal events stream to stdout as JSON lines
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::error!("Failed to serialize event: {e}"),
            }
        }
    });

    tracing::info!("Covault daemon ready");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
            line = lines.next_line() => {
                match line? {
                    Some(line) if line.trim().is_empty() => {}
                    Some(line) => handle_line(&state, &line),
                    None => break,
                }
            }
        }
    }

    Ok(())
}

/// Parse one command line and run its handler concurrently. Flows stream
/// their own progress events; the handler's direct result (or error) is
/// reported as a `command:done` / `command:error` line.
fn handle_line(state: &Arc<AppState>, line: &str) {
    let parsed: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => {
            print_line(&json!({"event": "command:error", "error": {
                "name": "ParseError",
                "message": e.to_string(),
            }}));
            return;
        }
    };

    let command = match parsed.get("command").and_then(Value::as_str) {
        Some(command) => command.to_string(),
        None => {
            print_line(&json!({"event": "command:error", "error": {
                "name": "ParseError",
                "message": "Missing 'command' field",
            }}));
            return;
        }
    };

    let Some(handler) = dispatch::lookup(&command) else {
        print_line(&json!({"event": "command:error", "command": command, "error": {
            "name": "UnknownCommand",
            "message": format!("Known commands: {}", dispatch::command_names().join(", ")),
        }}));
        return;
    };

    let data = parsed.get("data").cloned().unwrap_or_else(|| json!({}));
    let state = state.clone();
    tokio::spawn(async move {
        match handler(state, data).await {
            Ok(data) => {
                print_line(&json!({"event": "command:done", "command": command, "data": data}));
            }
            Err(e) => {
                print_line(&json!({
                    "event": "command:error",
                    "command": command,
                    "error": ErrorReport::from_error(&e),
                }));
            }
        }
    });
}

fn print_line(value: &Value) {
    println!("{value}");
}
