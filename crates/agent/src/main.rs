#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Analyzer agent: runs evidence analyzers on tasks claimed from a scheduler or
//! read from task files.

use std::path::PathBuf;

use analyzer_core::Storage;
use analyzer_plugins::{Config, Registry};
use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod local;
mod poll;

#[derive(Parser, Debug)]
#[command(name = "analyzer-agent")]
struct Args {
    /// Agent configuration (TOML).
    #[arg(long, default_value = "analyzer.toml")]
    config: PathBuf,

    /// Log level (env-filter syntax).
    #[arg(long, default_value = "info")]
    log: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the registered analyzer descriptors as JSON.
    List,

    /// Execute tasks from JSON files (one task or an array per file).
    Run {
        /// Task files.
        #[arg(required = true)]
        tasks: Vec<PathBuf>,
    },

    /// Claim tasks from a scheduler and report their outcome.
    Poll {
        /// Scheduler base URL, e.g. http://127.0.0.1:3000
        #[arg(long, default_value = "http://127.0.0.1:3000")]
        scheduler: String,

        /// Analyzers to claim work for. Defaults to every registered analyzer.
        #[arg(long = "analyzer")]
        analyzers: Vec<String>,

        /// Poll interval in milliseconds.
        #[arg(long, default_value_t = 1_000)]
        poll_ms: u64,

        /// If set, claim and run at most one task then exit.
        #[arg(long)]
        once: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&args.log))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::load_from(&args.config)
        .with_context(|| format!("load config {}", args.config.display()))?;
    let registry = Registry::from_config(&config);
    let storage = Storage::new(&config.storage.root);
    tracing::info!(
        storage = %storage.root().display(),
        analyzers = ?registry.names().collect::<Vec<_>>(),
        "agent configured"
    );

    match args.command {
        Command::List => {
            let descriptors = registry.descriptors();
            println!("{}", serde_json::to_string_pretty(&descriptors)?);
            Ok(())
        }
        Command::Run { tasks } => {
            let tasks = local::load_tasks(&tasks).await?;
            let reports = local::run_tasks(&registry, &storage, tasks).await?;
            for report in &reports {
                println!("{}", serde_json::to_string(report)?);
            }
            let failed = reports.iter().filter(|r| !r.success).count();
            if failed > 0 {
                anyhow::bail!("{failed} of {} analyses failed", reports.len());
            }
            Ok(())
        }
        Command::Poll {
            scheduler,
            analyzers,
            poll_ms,
            once,
        } => {
            let opts = poll::PollOptions {
                scheduler,
                analyzers,
                poll_ms,
                once,
            };
            poll::poll_loop(&registry, &storage, opts).await
        }
    }
}
