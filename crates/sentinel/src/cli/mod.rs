//! Command-line interface for sentinel.
//!
//! This module provides the CLI structure; the binary dispatches the parsed
//! commands.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    ConfigCommand, ImportCommand, InjectCommand, LogsCommand, OutputFormat, ResetCommand,
    ScenarioArg, ServeCommand, SimulateCommand, StatusArg, StatusCommand, StepCommand,
    ThresholdCommand, TransactionsCommand,
};

/// sentinel - Autonomous fraud-defense agent
///
/// Watches a stream of payment transactions, applies fraud rules, blocks and
/// investigates suspicious payments and tunes its own fraud threshold.
#[derive(Debug, Parser)]
#[command(name = "sentinel")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the agent loop behind the browser dashboard
    Serve(ServeCommand),

    /// Run the agent loop in the terminal
    Simulate(SimulateCommand),

    /// Run agent cycles immediately
    Step(StepCommand),

    /// Show agent and storage status
    Status(StatusCommand),

    /// Show the agent log
    Logs(LogsCommand),

    /// List stored transactions
    Transactions(TransactionsCommand),

    /// Import CSV transaction datasets
    Import(ImportCommand),

    /// Clear all stored data and re-initialize
    Reset(ResetCommand),

    /// Show or override the fraud threshold
    #[command(subcommand)]
    Threshold(ThresholdCommand),

    /// Inject a scenario into the transaction stream
    Inject(InjectCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::Verbosity;
    use clap::CommandFactory;

    fn status_cli(verbose: u8, quiet: bool) -> Cli {
        Cli {
            config: None,
            verbose,
            quiet,
            command: Command::Status(StatusCommand { json: false }),
        }
    }

    #[test]
    fn test_cli_name() {
        let cli = Cli::command();
        assert_eq!(cli.get_name(), "sentinel");
    }

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(status_cli(0, true).verbosity(), Verbosity::Quiet);
        assert_eq!(status_cli(0, false).verbosity(), Verbosity::Normal);
        assert_eq!(status_cli(1, false).verbosity(), Verbosity::Verbose);
        assert_eq!(status_cli(2, false).verbosity(), Verbosity::Trace);
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_serve() {
        let cli = Cli::try_parse_from(["sentinel", "serve", "--bind", "0.0.0.0:9000", "--autostart"])
            .unwrap();
        match cli.command {
            Command::Serve(cmd) => {
                assert_eq!(cmd.bind.as_deref(), Some("0.0.0.0:9000"));
                assert!(cmd.autostart);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_simulate() {
        let cli = Cli::try_parse_from(["sentinel", "simulate", "--cycles", "5", "--interval-ms", "100"])
            .unwrap();
        match cli.command {
            Command::Simulate(cmd) => {
                assert_eq!(cmd.cycles, Some(5));
                assert_eq!(cmd.interval_ms, Some(100));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_step_default_count() {
        let cli = Cli::try_parse_from(["sentinel", "step"]).unwrap();
        assert!(matches!(cli.command, Command::Step(StepCommand { count: 1 })));
    }

    #[test]
    fn test_parse_transactions_filters() {
        let cli = Cli::try_parse_from([
            "sentinel",
            "transactions",
            "--status",
            "blocked",
            "--bank",
            "HDFC",
            "--min-risk",
            "20",
            "--format",
            "json",
        ])
        .unwrap();
        match cli.command {
            Command::Transactions(cmd) => {
                assert_eq!(cmd.status, Some(StatusArg::Blocked));
                assert_eq!(cmd.bank.as_deref(), Some("HDFC"));
                assert_eq!(cmd.min_risk, Some(20));
                assert_eq!(cmd.format, OutputFormat::Json);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_threshold_set() {
        let cli = Cli::try_parse_from(["sentinel", "threshold", "set", "0.65"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Threshold(ThresholdCommand::Set { value }) if (value - 0.65).abs() < f64::EPSILON
        ));
    }

    #[test]
    fn test_parse_inject() {
        let cli = Cli::try_parse_from(["sentinel", "inject", "bank-outage"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Inject(InjectCommand {
                scenario: ScenarioArg::BankOutage
            })
        ));

        assert!(Cli::try_parse_from(["sentinel", "inject", "meteor"]).is_err());
    }

    #[test]
    fn test_parse_import_files() {
        let cli = Cli::try_parse_from(["sentinel", "import", "a.csv", "b.csv"]).unwrap();
        match cli.command {
            Command::Import(cmd) => assert_eq!(cmd.files.len(), 2),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_with_config() {
        let cli = Cli::try_parse_from(["sentinel", "-c", "/custom/config.toml", "status"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
    }

    #[test]
    fn test_parse_with_verbose_and_quiet() {
        let cli = Cli::try_parse_from(["sentinel", "-vv", "logs"]).unwrap();
        assert_eq!(cli.verbose, 2);

        let cli = Cli::try_parse_from(["sentinel", "-q", "status"]).unwrap();
        assert!(cli.quiet);
    }
}
