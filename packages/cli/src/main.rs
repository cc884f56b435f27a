mod commands;
mod config;

use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::{replay, show, summary, ReplayArgs, ShowArgs, SummaryArgs};
use config::Config;
use tracing_subscriber::EnvFilter;

/// nbhist - versioned history for notebook cells
#[derive(Parser, Debug)]
#[command(name = "nbhist")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a notebook event script and write its history
    Replay(ReplayArgs),

    /// Summarize a history file
    Summary(SummaryArgs),

    /// Show one node version from a history file
    Show(ShowArgs),
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let cwd = std::env::current_dir()
        .map(|dir| dir.display().to_string())
        .unwrap_or_else(|_| ".".to_string());

    let result = match Config::load(&cwd) {
        Ok(config) => {
            init_tracing(&config);
            match cli.command {
                Command::Replay(args) => replay(args, &config).await,
                Command::Summary(args) => summary(args),
                Command::Show(args) => show(args),
            }
        }
        Err(err) => Err(err),
    };

    if let Err(err) = result {
        eprintln!();
        eprintln!("{} {:#}", "Error:".red().bold(), err);
        eprintln!();
        std::process::exit(1);
    }
}
