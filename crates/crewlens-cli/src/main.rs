//! Terminal host for crewlens: live `watch` and offline `replay`.

mod render;
mod replay;

use clap::{Parser, Subcommand, ValueEnum};
use crewlens_client::{load_config, ClientConfig, SessionRuntime, DEFAULT_CONFIG_FILE};
use crewlens_session::Message;
use std::io::BufReader;
use std::path::PathBuf;
use tokio::io::AsyncBufReadExt;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "crewlens", version, about = "crewlens: live view of a multi-agent backend")]
struct Cli {
    /// Path to config file [default: crewlens.toml, optional]
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the backend, send stdin lines as requests and print the
    /// transcript as it changes. `/status` asks for every agent's status.
    Watch {
        /// WebSocket URL (overrides config)
        #[arg(long)]
        url: Option<String>,
        /// Reconnect delay in milliseconds (overrides config)
        #[arg(long)]
        reconnect_delay_ms: Option<u64>,
    },
    /// Fold a recorded JSON-lines event file and print the resulting session
    Replay {
        /// Recording to read
        file: PathBuf,
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Maximum layout simulation steps
        #[arg(long, default_value_t = 300)]
        layout_ticks: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn init_tracing(json: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    let (config_path, explicit) = match cli.config {
        Some(path) => (path, true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };
    let mut config = load_config(&config_path, explicit)?;

    match cli.command {
        Commands::Watch {
            url,
            reconnect_delay_ms,
        } => {
            if let Some(url) = url {
                config.server.url = url;
            }
            if let Some(delay) = reconnect_delay_ms {
                config.server.reconnect_delay_ms = delay;
            }
            config.server.validate()?;
            watch(config).await?;
        }
        Commands::Replay {
            file,
            format,
            layout_ticks,
        } => {
            let reader = std::fs::File::open(&file).map_err(|e| {
                anyhow::anyhow!("Failed to open recording '{}': {}", file.display(), e)
            })?;
            let report = replay::replay(BufReader::new(reader), config.session, layout_ticks)?;
            match format {
                OutputFormat::Text => {
                    print!("{}", render::format_snapshot(&report.session, &report.layout));
                }
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
            }
        }
    }

    Ok(())
}

async fn watch(config: ClientConfig) -> anyhow::Result<()> {
    info!(url = %config.server.url, "Watching agent backend");
    let handle = SessionRuntime::spawn(config);
    let mut updates = handle.subscribe();
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut last_printed = 0;

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                last_printed = print_new_messages(&snapshot.transcript, last_printed);
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    let text = line.trim();
                    if text.is_empty() {
                        continue;
                    }
                    if text == "/status" {
                        handle.request_agent_status().await;
                    } else {
                        handle.submit(text).await;
                    }
                }
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!(error = %e, "Failed to read stdin");
                    stdin_open = false;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}

/// Print transcript entries newer than `last_printed`; returns the newest id
/// printed so far.
fn print_new_messages(transcript: &[Message], last_printed: u64) -> u64 {
    let mut newest = last_printed;
    for message in transcript.iter().filter(|m| m.id > last_printed) {
        println!("{}", render::format_message(message));
        newest = newest.max(message.id);
    }
    newest
}
