use std::process::ExitCode;

use clap::Parser;
use tokio::signal;
use tracing::info;

use loadseek::adapter::inbound::cli::command::{Cli, Commands};
use loadseek::adapter::inbound::cli::output::{self, OutputConfig};
use loadseek::adapter::inbound::cli::{check, run, status};

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    output::configure(OutputConfig::new(cli.json, cli.quiet, cli.verbose), &cli.color);

    let result = match &cli.command {
        Commands::Run(args) => {
            tokio::select! {
                result = run::execute(&cli.config, args) => result,
                _ = signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    output::warning("Interrupted; the current run was not stopped on the controller");
                    return ExitCode::from(130);
                }
            }
        }
        Commands::Check(args) => check::execute(&cli.config, args).map(|()| true),
        Commands::Status(args) => status::execute(&cli.config, &args.run_id)
            .await
            .map(|()| true),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            output::error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}
