pub mod commands;
pub mod logging;

use clap::{Parser, Subcommand};
use commands::{history::HistoryArgs, serve::ServeArgs};
use logging::LogFormat;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "stagehand",
    about = "Stagehand environment provisioning server",
    long_about = "Run the provisioning server or inspect the environments it has created.",
    after_help = "Examples:\n  stagehand serve --bind 0.0.0.0:3000\n  stagehand history --file environments.json"
)]
pub struct Cli {
    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Serve the provisioning API against the local Docker daemon")]
    Serve(ServeArgs),
    #[command(about = "Print the persisted environment history, newest first")]
    History(HistoryArgs),
}

pub async fn run() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.log_format);

    let result = match cli.command {
        Command::Serve(args) => commands::serve::run(args).await,
        Command::History(args) => commands::history::run(args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_is_global() {
        let cli = Cli::try_parse_from(["stagehand", "history", "--log-format", "json"]).unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
        assert!(matches!(cli.command, Command::History(_)));
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        assert!(Cli::try_parse_from(["stagehand", "--log-format", "xml", "history"]).is_err());
    }
}
