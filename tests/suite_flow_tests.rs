mod support;

use loadseek::adapter::outbound::csv::CsvReportSink;
use loadseek::application::SuiteRunner;
use loadseek::domain::run::{FailureReason, RunOutcome, StopReason};
use loadseek::error::ControllerError;
use loadseek::infrastructure::config::settings::Config;
use loadseek::domain::test_type::LoadKey;
use loadseek::testkit::controller::{sample, ScriptedController};
use loadseek::testkit::sink::RecordingSink;

fn finishing_controller() -> ScriptedController {
    ScriptedController::new().with_statistics(vec![
        sample(100.0, 10.0, 10.0, 90.0),
        sample(100.0, 10.0, 14.0, 0.0),
    ])
}

// ---------------------------------------------------------------------------
// Config to suite
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn configured_test_runs_to_completion() {
    let config = Config::parse_toml(&support::config::config_toml(&[
        support::config::test_entry("tput", "nightly", 1),
        support::config::test_entry("skipped", "weekly", 2),
    ]))
    .unwrap();
    let tests = config.selected_tests(&[], None).unwrap();
    assert_eq!(tests.len(), 1);

    let controller = finishing_controller();
    let calls = controller.calls();
    let mut sink = RecordingSink::new();
    let recorded = sink.recorded();

    let summary = SuiteRunner::new(&controller, &mut sink)
        .run(&tests)
        .await
        .unwrap();

    assert!(summary.all_passed());
    assert_eq!(summary.reports.len(), 1);
    assert_eq!(summary.reports[0].name, "tput");
    assert_eq!(
        summary.reports[0].outcome,
        RunOutcome::Completed {
            stop: Some(StopReason::TimeExpired)
        }
    );

    assert_eq!(calls.connects(), 1);
    assert_eq!(calls.stops(), vec!["run-1".to_string()]);
    assert!(calls.loads().is_empty());

    let updates = calls.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].load.duration, 100);
    assert_eq!(updates[0].load.start_load, Some((LoadKey::Bandwidth, 10)));

    let devices = recorded.devices();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].ip, "10.0.0.5");
    assert!(recorded.column("test_name").iter().all(|name| name == "tput"));
    assert!(recorded.rows().len() >= 3);
}

#[tokio::test(start_paused = true)]
async fn start_failure_is_reported_per_test() {
    let config = Config::parse_toml(&support::config::config_toml(&[
        support::config::test_entry("tput", "nightly", 1),
    ]))
    .unwrap();
    let tests = config.selected_tests(&[], None).unwrap();

    let controller = ScriptedController::new().with_start_results(vec![Err(
        ControllerError::Http {
            status: 409,
            body: "device busy".into(),
        }
        .into(),
    )]);
    let mut sink = RecordingSink::new();

    let summary = SuiteRunner::new(&controller, &mut sink)
        .run(&tests)
        .await
        .unwrap();

    assert_eq!(summary.failed(), 1);
    assert!(matches!(
        &summary.reports[0].outcome,
        RunOutcome::Failed(FailureReason::StartFailed(reason)) if reason.contains("device busy")
    ));
}

// ---------------------------------------------------------------------------
// Detailed report on disk
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn csv_report_gets_one_line_per_row() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::parse_toml(&support::config::config_toml(&[
        support::config::test_entry("tput", "nightly", 1),
    ]))
    .unwrap();
    let tests = config.selected_tests(&[], None).unwrap();

    let controller = finishing_controller();
    let mut sink = CsvReportSink::with_stamp(dir.path(), "20260101-0000");

    let summary = SuiteRunner::new(&controller, &mut sink)
        .run(&tests)
        .await
        .unwrap();
    assert!(summary.all_passed());

    let path = sink.path().unwrap().to_path_buf();
    assert!(path.ends_with("10.0.0.5_20.1_20260101-0000_Detailed.csv"));

    let content = std::fs::read_to_string(path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert!(lines[0].starts_with("test_name,seconds,state,"));
    assert!(lines.len() >= 4);
    assert!(lines[1..].iter().all(|line| line.starts_with("tput,")));
}
