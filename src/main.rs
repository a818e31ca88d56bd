//! Perpetual futures screener - main entry point
//!
//! This binary provides four subcommands:
//! - run: Scan continuously, send alerts and manage auto-scalp positions
//! - scan: Run one scan cycle and print the ranked list
//! - stats: Show auto-scalp statistics from the database
//! - journal: Record and review manual trades

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "perp-screener")]
#[command(about = "Multi-timeframe perpetual futures screener with alerts and auto-scalping", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "configs/default.json")]
    config: String,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the screener until Ctrl+C
    Run,

    /// Run one scan cycle and print the top symbols
    Scan {
        /// Number of symbols to show
        #[arg(short, long, default_value = "20")]
        top: usize,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show auto-scalp statistics
    Stats {
        /// Lookback window in hours
        #[arg(long, default_value = "24")]
        hours: i64,
    },

    /// Manual trade journal
    Journal {
        #[command(subcommand)]
        action: commands::journal::JournalAction,
    },
}

fn setup_logging(verbose: bool, command_name: &str, file_only: bool) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    // Set log level - filter out noisy external crates
    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!(
        "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn",
        level
    );
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false);

    if file_only {
        // scan, stats and journal keep stdout for their output
        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .init();
    } else {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .with(console_layer)
            .init();

        info!("Logging initialized");
        info!("Log file: {}", log_path.display());
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (command_name, file_only) = match &cli.command {
        Commands::Run => ("run", false),
        Commands::Scan { .. } => ("scan", true),
        Commands::Stats { .. } => ("stats", true),
        Commands::Journal { .. } => ("journal", true),
    };

    setup_logging(cli.verbose, command_name, file_only)?;

    match cli.command {
        Commands::Run => commands::run::run(cli.config),
        Commands::Scan { top, json } => commands::scan::run(cli.config, top, json),
        Commands::Stats { hours } => commands::stats::run(cli.config, hours),
        Commands::Journal { action } => commands::journal::run(cli.config, action),
    }
}
