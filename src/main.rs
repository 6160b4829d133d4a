//! guarded-sql console entry point.
//!
//! Reads one statement or command per line from stdin and writes JSON results
//! to stdout. Logs go to stderr.
//!
//! Commands:
//! - `\tables`: list base tables
//! - `\schema <table>`: describe a table
//! - `\health`: ping the database
//! - `\status`: connection diagnostics
//! - `\policy`: active allow-list and block-list
//! - `\unsafe on|off`: toggle unsafe mode
//! - `\quit`: exit

use anyhow::{Context, Result};
use guarded_sql::{Config, ConnectionManager};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging to stderr (stdout carries results)
    init_logging();

    let version = env!("CARGO_PKG_VERSION");
    eprintln!("guarded-sql v{version} starting...");

    // Load configuration from environment
    let config = Config::from_env().context("failed to load configuration")?;
    let manager = ConnectionManager::new(config)
        .await
        .context("failed to create connection manager")?;

    if manager.is_unsafe_mode_enabled() {
        eprintln!("WARNING: unsafe mode is enabled; all statements are permitted");
    }
    eprintln!("Ready. Enter SQL or \\quit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => {
                eprintln!("Interrupted");
                None
            }
        };

        let Some(line) = line else {
            break;
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        let output = match run_line(&manager, input).await {
            Some(output) => output,
            None => break,
        };

        stdout.write_all(output.to_string().as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    manager.close().await?;
    eprintln!("Shutdown complete");

    Ok(())
}

/// Execute one console line. `None` means quit.
async fn run_line(manager: &ConnectionManager, input: &str) -> Option<serde_json::Value> {
    let Some(command) = input.strip_prefix('\\') else {
        return Some(into_json(manager.query(input, &[]).await));
    };

    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };

    let output = match (name, arg) {
        ("quit" | "q", _) => return None,
        ("tables", _) => into_json(manager.get_tables().await),
        ("schema", "") => json!({ "error": "usage: \\schema <table>" }),
        ("schema", table) => into_json(manager.get_table_schema(table).await),
        ("health", _) => into_json(manager.health_check().await.map(|()| "ok")),
        ("status", _) => into_json(Ok(manager.status())),
        ("policy", _) => json!({
            "unsafe_mode": manager.is_unsafe_mode_enabled(),
            "allowed_operations": manager.allowed_operations(),
            "blocked_operations": manager.blocked_operations(),
        }),
        ("unsafe", "on") => {
            manager.enable_unsafe_mode();
            json!({ "unsafe_mode": true })
        }
        ("unsafe", "off") => {
            manager.disable_unsafe_mode();
            json!({ "unsafe_mode": false })
        }
        ("unsafe", _) => json!({ "error": "usage: \\unsafe on|off" }),
        (other, _) => json!({ "error": format!("unknown command: \\{}", other) }),
    };

    Some(output)
}

fn into_json<T: serde::Serialize>(
    result: Result<T, guarded_sql::ServerError>,
) -> serde_json::Value {
    match result {
        Ok(value) => json!({ "ok": value }),
        Err(e) => json!({ "error": e.user_message() }),
    }
}

/// Initialize tracing subscriber with stderr output.
fn init_logging() {
    let filter = std::env::var("RUST_LOG")
        .map(EnvFilter::new)
        .unwrap_or_else(|_| EnvFilter::new("warn,guarded_sql=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}
