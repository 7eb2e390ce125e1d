//! Command-line interface definitions.
//!
//! Defines the CLI structure for loadseek using `clap`: run the configured
//! tests, check a configuration file, or query one run.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Adaptive load control for traffic generation appliances
#[derive(Parser, Debug)]
#[command(name = "loadseek")]
#[command(version)]
pub struct Cli {
    /// Color output mode [auto, always, never]
    #[arg(
        long,
        global = true,
        default_value = "auto",
        hide_possible_values = true
    )]
    pub color: ColorChoice,

    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = "config.toml")]
    pub config: PathBuf,

    /// JSON output for scripting
    #[arg(long, global = true)]
    pub json: bool,

    /// Decrease output verbosity
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Increase output verbosity
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Color output mode for terminal rendering.
#[derive(Clone, Debug, Default, clap::ValueEnum)]
pub enum ColorChoice {
    /// Detect automatically
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the selected tests one after another
    Run(RunArgs),

    /// Validate the configuration and list the tests that would run
    Check(CheckArgs),

    /// Show the status of one test run
    Status(StatusArgs),
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Suite to run; repeat to select several (overrides `[run] suites`)
    #[arg(long = "suite")]
    pub suites: Vec<String>,

    /// Run only the test with this name
    #[arg(long)]
    pub test: Option<String>,

    /// Log level (overrides config)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,

    /// Directory for detailed reports (overrides config)
    #[arg(long)]
    pub report_dir: Option<PathBuf>,
}

/// Arguments for the `check` subcommand.
#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Suite to check; repeat to select several
    #[arg(long = "suite")]
    pub suites: Vec<String>,
}

/// Arguments for the `status` subcommand.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Controller run id
    pub run_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_defaults() {
        let cli = Cli::try_parse_from(["loadseek", "run"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("config.toml"));
        assert!(!cli.json);
        assert!(!cli.quiet);
        assert_eq!(cli.verbose, 0);
        assert!(matches!(cli.color, ColorChoice::Auto));

        let Commands::Run(args) = cli.command else {
            panic!("Expected Run command");
        };
        assert!(args.suites.is_empty());
        assert!(args.test.is_none());
        assert!(args.log_level.is_none());
        assert!(!args.json_logs);
        assert!(args.report_dir.is_none());
    }

    #[test]
    fn suites_can_be_repeated() {
        let cli = Cli::try_parse_from([
            "loadseek", "run", "--suite", "default", "--suite", "nightly", "--test", "tput",
        ])
        .unwrap();

        let Commands::Run(args) = cli.command else {
            panic!("Expected Run command");
        };
        assert_eq!(args.suites, ["default", "nightly"]);
        assert_eq!(args.test.as_deref(), Some("tput"));
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli =
            Cli::try_parse_from(["loadseek", "check", "-c", "lab.toml", "-vv", "--json"]).unwrap();
        assert!(matches!(cli.command, Commands::Check(_)));
        assert_eq!(cli.config, PathBuf::from("lab.toml"));
        assert_eq!(cli.verbose, 2);
        assert!(cli.json);
    }

    #[test]
    fn status_requires_a_run_id() {
        assert!(Cli::try_parse_from(["loadseek", "status"]).is_err());

        let cli = Cli::try_parse_from(["loadseek", "status", "run-42"]).unwrap();
        let Commands::Status(args) = cli.command else {
            panic!("Expected Status command");
        };
        assert_eq!(args.run_id, "run-42");
    }

    #[test]
    fn color_choice_parses() {
        let cli = Cli::try_parse_from(["loadseek", "--color", "never", "run"]).unwrap();
        assert!(matches!(cli.color, ColorChoice::Never));
    }
}
