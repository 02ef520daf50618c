//! codexd - runs the bridge against a line-delimited JSON conversation stream
//!
//! Reads conversation events and UI actions from stdin (see `wire`),
//! drives `codexd_core::Bridge` with a PTY host and writes command results
//! and render frames to stdout. Logs go to stderr and, with `--log-dir`,
//! to a daily-rotated file.

mod wire;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use codexd_core::config::CONFIG_PATH_ENV;
use codexd_core::{extract_mention_text, BridgeConfig, BridgeHandle, PtyHost, TaskRequest};

use crate::wire::{Inbound, JsonLineRenderer, JsonLineWriter, Outbound};

#[derive(Parser, Debug)]
#[command(name = "codexd")]
#[command(about = "Bridge conversation threads to interactive codex CLI sessions")]
#[command(version)]
struct Args {
    /// YAML config file (defaults to $CODEXD_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Also write logs to a daily-rotated file in this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

fn log_filter() -> tracing_subscriber::EnvFilter {
    let level = if let Ok(v) = std::env::var("RUST_LOG") {
        v
    } else if let Ok(v) = std::env::var("CODEXD_LOG_LEVEL") {
        match v.as_str() {
            "silent" => "off".to_string(),
            "fatal" => "error".to_string(),
            other => other.to_string(),
        }
    } else {
        "info".to_string()
    };

    tracing_subscriber::EnvFilter::try_new(level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
}

/// stderr + optional file (daily rotation). Keep the guard alive until exit.
fn init_logging(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log dir {}", dir.display()))?;
            let file_appender = tracing_appender::rolling::daily(dir, "codexd.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(log_filter())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(guard)
}

fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let payload = if let Some(s) = info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };
        let location = info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_default();
        eprintln!("PANIC at {}: {}", location, payload);
        tracing::error!(location = %location, "DAEMON PANIC: {}", payload);
    }));
}

/// Apply one inbound line. Protocol errors are reported on stdout, not fatal.
async fn handle_line(bridge: &BridgeHandle, out: &JsonLineWriter, line: &str) -> Result<()> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(());
    }

    let event = match Inbound::parse(line) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "Malformed input line");
            return out
                .emit(&Outbound::Error {
                    thread_id: None,
                    message: format!("malformed input: {}", e),
                })
                .await;
        }
    };
    debug!(event = ?event, "Inbound event");

    let reply = match event {
        Inbound::Message {
            thread_id,
            conversation_id,
            message_id,
            text,
        } => {
            let prompt = extract_mention_text(&text);
            if prompt.is_empty() {
                warn!(thread_id = %thread_id, "Empty prompt received");
                Outbound::Rejected {
                    thread_id,
                    reason: "empty prompt".to_string(),
                }
            } else {
                let request = TaskRequest {
                    thread_id: thread_id.clone(),
                    conversation_id,
                    anchor_message_id: message_id,
                    text: prompt,
                };
                match bridge.start_or_resume(request).await {
                    Ok(outcome) => Outbound::Started(outcome),
                    Err(e) => {
                        error!(thread_id = %thread_id, error = %e, "Failed to start session");
                        Outbound::Error {
                            thread_id: Some(thread_id),
                            message: e.to_string(),
                        }
                    }
                }
            }
        }
        Inbound::Input { session_key, text } => {
            let delivered = bridge.send_input(&session_key, &text).await;
            Outbound::InputDelivered {
                session_key,
                delivered,
            }
        }
        Inbound::Stop { session_key } => {
            let stopped = bridge.stop(&session_key).await;
            Outbound::Stopped {
                session_key,
                stopped,
            }
        }
        Inbound::Snapshot { session_key } => {
            let snapshot = bridge.snapshot(&session_key).await;
            Outbound::Snapshot {
                session_key,
                snapshot,
            }
        }
        Inbound::Stats => Outbound::Stats(bridge.stats().await?),
    };

    out.emit(&reply).await
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = init_logging(args.log_dir.as_deref())?;
    install_panic_hook();

    let config_path = args
        .config
        .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from));
    let config =
        BridgeConfig::load(config_path.as_deref()).context("Failed to load configuration")?;
    info!(
        command = %config.launch.command,
        provider = %config.launch.provider,
        model = ?config.launch.model,
        "codexd starting"
    );

    let out = Arc::new(JsonLineWriter::stdout());
    let renderer = Arc::new(JsonLineRenderer::new(Arc::clone(&out), &config.render));
    let (bridge, handle) = codexd_core::Bridge::new(&config, Arc::new(PtyHost::new()), renderer);
    let bridge_task = bridge.spawn();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line.context("Failed to read stdin")? {
                    Some(line) => {
                        if let Err(e) = handle_line(&handle, &out, &line).await {
                            error!(error = %e, "Failed to handle input line");
                        }
                    }
                    None => {
                        info!("stdin closed");
                        break;
                    }
                }
            }
            _ = &mut ctrl_c => {
                info!("Received Ctrl+C");
                break;
            }
        }
    }

    match handle.shutdown().await {
        Ok(stopped) => info!(stopped, "Stopped sessions on shutdown"),
        Err(e) => warn!(error = %e, "Bridge already closed"),
    }
    if let Err(e) = bridge_task.await {
        error!(error = %e, "Bridge task failed");
    }

    info!("codexd exited");
    Ok(())
}
