mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::EnvFilter;

use commands::analyze::AnalyzeArgs;
use commands::jobs::RunJobArgs;
use commands::rules::RulesArgs;

pub const EXIT_OK: i32 = 0;
pub const EXIT_BAD_ARGS: i32 = 2;
pub const EXIT_UPSTREAM: i32 = 3;
pub const EXIT_TIMEOUT: i32 = 4;
pub const EXIT_CANCELLED: i32 = 5;

/// Forensic financial analysis for listed Indian companies
#[derive(Parser)]
#[command(
    name = "drishti",
    version,
    about = "Forensic financial analysis for listed Indian companies",
    long_about = "Runs statement normalization, ratio and common-size analysis, \
                  Altman Z-Score, Beneish M-Score, Benford digit tests, anomaly \
                  detection, composite risk scoring and regulatory compliance \
                  validation, either offline over a statement file or as an \
                  orchestrated job."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,
}

#[derive(Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Minimal,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full forensic pipeline offline over a statement file
    Analyze(AnalyzeArgs),
    /// Submit and drive an orchestrated analysis job to completion
    RunJob(RunJobArgs),
    /// Inspect a compliance rule pack
    Rules(RulesArgs),
    /// Print version information
    Version,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let (result, exit_code) = match cli.command {
        Commands::Analyze(args) => (commands::analyze::run_analyze(args), EXIT_OK),
        Commands::Rules(args) => (commands::rules::run_rules(args), EXIT_OK),
        Commands::RunJob(args) => match commands::jobs::run_job(args).await {
            Ok((value, code)) => (Ok(value), code),
            Err(e) => (Err(e), EXIT_OK),
        },
        Commands::Version => {
            println!("drishti {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(exit_code);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(EXIT_BAD_ARGS);
        }
    }
}
