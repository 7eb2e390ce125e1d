//! Handler for the `run` command.

use std::path::{Path, PathBuf};

use crate::adapter::inbound::cli::command::RunArgs;
use crate::adapter::inbound::cli::output;
use crate::adapter::outbound::controller::HttpControllerClient;
use crate::adapter::outbound::csv::CsvReportSink;
use crate::application::{SuiteRunner, SuiteSummary};
use crate::domain::run::RunOutcome;
use crate::error::Result;
use crate::infrastructure::config::logging::LoggingConfig;
use crate::infrastructure::config::settings::Config;

/// Execute the run command. Returns whether every test passed.
pub async fn execute(config_path: &Path, args: &RunArgs) -> Result<bool> {
    let config = Config::load(config_path)?;
    logging_config(&config.logging, args, output::is_json()).init();

    let tests = config.selected_tests(&args.suites, args.test.as_deref())?;
    let report_dir = args
        .report_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.output.report_dir));

    output::header(env!("CARGO_PKG_VERSION"));
    output::field("Controller", &config.controller.address);
    output::field("Tests", tests.len());
    output::field("Reports", report_dir.display());

    if tests.is_empty() {
        output::warning("No tests selected; check `run` flags and `[run] suites`");
        return Ok(true);
    }

    let controller = HttpControllerClient::from_config(&config.controller);
    let mut sink = CsvReportSink::new(&report_dir);
    let summary = SuiteRunner::new(&controller, &mut sink).run(&tests).await?;

    print_summary(&summary);
    Ok(summary.all_passed())
}

/// Config logging with `--log-level` and `--json-logs` applied.
fn logging_config(base: &LoggingConfig, args: &RunArgs, force_json: bool) -> LoggingConfig {
    let mut logging = base.clone();
    if let Some(level) = &args.log_level {
        logging.level = level.clone();
    }
    if args.json_logs || force_json {
        logging.format = "json".into();
    }
    logging
}

fn print_summary(summary: &SuiteSummary) {
    output::section("Results");
    for report in &summary.reports {
        let elapsed = output::muted(format!("({}s)", report.duration.as_secs()));
        match &report.outcome {
            RunOutcome::Completed { stop: Some(reason) } => {
                output::success(&format!("{}: {reason} {elapsed}", report.name));
            }
            RunOutcome::Completed { stop: None } => {
                output::success(&format!("{} {elapsed}", report.name));
            }
            RunOutcome::Failed(reason) => {
                output::error(&format!("{}: {reason} {elapsed}", report.name));
            }
        }
    }
    output::field("Passed", summary.passed());
    output::field("Failed", summary.failed());
    output::field("Duration", format!("{}s", summary.duration.as_secs()));
}
