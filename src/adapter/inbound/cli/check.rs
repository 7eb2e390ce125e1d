//! Handler for the `check` command.

use std::path::Path;

use crate::adapter::inbound::cli::command::CheckArgs;
use crate::adapter::inbound::cli::output;
use crate::adapter::outbound::controller::settings::PASSWORD_ENV;
use crate::domain::run::TestRunConfig;
use crate::domain::test_type::CapacityAdjust;
use crate::error::Result;
use crate::infrastructure::config::settings::Config;

/// Validate the configuration file and list the tests `run` would execute.
pub fn execute(config_path: &Path, args: &CheckArgs) -> Result<()> {
    let config = Config::load(config_path)?;
    let tests = config.selected_tests(&args.suites, None)?;

    output::section("Configuration Check");
    output::field("Config", config_path.display());
    output::success("Configuration file is valid");

    output::section("Summary");
    output::field("Controller", &config.controller.address);
    output::field("Reports", &config.output.report_dir);
    let suites = if args.suites.is_empty() {
        &config.run.suites
    } else {
        &args.suites
    };
    output::field("Suites", suites.join(", "));
    output::field("Configured", config.tests.len());
    output::field("Selected", tests.len());

    if config.controller.password.is_empty() {
        output::warning(&format!(
            "Controller password not configured (set {PASSWORD_ENV})"
        ));
    }

    if !tests.is_empty() {
        output::section("Tests");
        for test in &tests {
            output::field(&test.name, describe(test));
        }
    }

    output::success("Configuration check complete");
    Ok(())
}

fn describe(test: &TestRunConfig) -> String {
    let mut modes = Vec::new();
    if test.goal_seek {
        modes.push("goal seek");
    }
    if test.ramp_seek.is_some() {
        modes.push("ramp seek");
    }
    if modes.is_empty() {
        modes.push("fixed load");
    }
    let capacity = match test.capacity_adjust {
        CapacityAdjust::Auto => "auto".to_string(),
        CapacityAdjust::Fixed(value) => value.to_string(),
    };

    let summary = format!(
        "{} {} start {} x{} {}s, {} ({})",
        test.test_type,
        test.load_type,
        test.start_load,
        capacity,
        test.phases.duration,
        modes.join(" + "),
        test.strategy.as_str(),
    );
    if output::verbosity() > 0 {
        format!("{summary} [{}]", output::muted(&test.test_id))
    } else {
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::profile::tput_config;

    #[test]
    fn description_names_modes_and_strategy() {
        let mut config = tput_config();
        config.goal_seek = true;
        let line = describe(&config);
        assert!(line.contains("goal seek"));
        assert!(line.contains(config.strategy.as_str()));
        assert!(line.contains(&format!("start {}", config.start_load)));

        config.goal_seek = false;
        config.ramp_seek = None;
        assert!(describe(&config).contains("fixed load"));
    }
}
