use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::future::join_all;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use logtap_logs::{LogService, LogSource, LogsResponse};

mod config;

use config::Settings;

/// logtap - Cached, load-shedding tail of a systemd unit's journal
#[derive(Parser, Debug)]
#[command(name = "logtap")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Service unit to tail (overrides the configuration file)
    #[arg(long, global = true)]
    unit: Option<String>,

    /// Log decisions (cache hits, load shedding, fallbacks) to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch the most recent lines once and print the JSON response
    Logs {
        /// Number of most recent lines
        #[arg(long)]
        lines: Option<i64>,
    },

    /// Poll for logs at a fixed interval until interrupted
    Watch {
        /// Number of most recent lines
        #[arg(long)]
        lines: Option<i64>,

        /// Poll interval in milliseconds
        #[arg(long, default_value_t = 2000, value_parser = clap::value_parser!(u64).range(1..))]
        interval_ms: u64,
    },

    /// Fire concurrent requests and summarize how they were answered
    Burst {
        /// Number of most recent lines
        #[arg(long)]
        lines: Option<i64>,

        /// Number of simultaneous requests
        #[arg(long, default_value_t = 4)]
        count: usize,

        /// Give every request its own line count so none can share the cache
        #[arg(long)]
        distinct: bool,
    },
}

/// Result of a burst run
#[derive(Serialize, Debug)]
struct BurstSummary {
    requests: usize,
    outcomes: BTreeMap<&'static str, usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr, stdout carries the JSON responses
    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();

    let result = run(args).await;

    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

async fn run(args: Args) -> Result<()> {
    let mut settings =
        Settings::load_or_default(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(unit) = args.unit {
        settings.source.unit = unit;
    }

    let default_lines = settings.request.default_lines;
    let service = Arc::new(LogService::with_limits(
        settings.log_source(),
        settings.limits(),
    ));

    match args.command.unwrap_or(Command::Logs { lines: None }) {
        Command::Logs { lines } => {
            let response = service.get_logs(lines.unwrap_or(default_lines)).await;
            print_json(&response)
        }
        Command::Watch { lines, interval_ms } => {
            watch(
                service,
                lines.unwrap_or(default_lines),
                Duration::from_millis(interval_ms),
            )
            .await
        }
        Command::Burst {
            lines,
            count,
            distinct,
        } => burst(service, lines.unwrap_or(default_lines), count, distinct).await,
    }
}

/// Poll `get_logs` until Ctrl-C, one timestamped JSON line per poll
async fn watch<S: LogSource + 'static>(
    service: Arc<LogService<S>>,
    lines: i64,
    interval: Duration,
) -> Result<()> {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            _ = ticker.tick() => {
                let response = service.get_logs(lines).await;
                let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
                println!("{} {}", timestamp, serde_json::to_string(&response)?);
            }
        }
    }

    Ok(())
}

/// Issue `count` simultaneous requests and print how each was answered
async fn burst<S: LogSource + 'static>(
    service: Arc<LogService<S>>,
    lines: i64,
    count: usize,
    distinct: bool,
) -> Result<()> {
    let tasks = (0..count).map(|i| {
        let service = Arc::clone(&service);
        let lines = if distinct {
            lines.saturating_add(i as i64)
        } else {
            lines
        };
        tokio::spawn(async move { service.get_logs(lines).await })
    });

    let mut outcomes = BTreeMap::new();
    for joined in join_all(tasks).await {
        let response: LogsResponse = joined.context("Request task failed")?;
        *outcomes.entry(response.outcome().as_str()).or_insert(0) += 1;
    }

    print_json(&BurstSummary {
        requests: count,
        outcomes,
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize response")?;
    println!("{}", json);
    Ok(())
}
