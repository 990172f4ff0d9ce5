use clap::{Parser, Subcommand};

use tally_cli::commands;

/// Tally -- static analysis of LLM SDK usage.
#[derive(Parser)]
#[command(name = "tally", about = "Tally -- static analysis of LLM SDK usage")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a file or project for risky and costly LLM API usage.
    Scan(commands::scan::ScanArgs),
    /// Apply the safe automated fixes.
    Fix(commands::fix::FixArgs),
    /// Show, create or validate tally configuration.
    Config(commands::config::ConfigArgs),
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Scan(args) => commands::scan::execute(args),
        Commands::Fix(args) => commands::fix::execute(args),
        Commands::Config(args) => commands::config::execute(args),
    };

    match result {
        Ok(code) => tally_cli::terminate(code),
        Err(err) => {
            eprintln!("tally: error: {err:#}");
            tally_cli::terminate(tally_cli::ExitCode::EngineError)
        }
    }
}
