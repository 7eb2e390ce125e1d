//! Sequential execution of the selected tests.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{error, info, warn};

use super::runner::RunLoop;
use super::setup::RunSetup;
use crate::domain::run::{FailureReason, RunOutcome, TestRunConfig};
use crate::error::Result;
use crate::port::outbound::controller::ControllerClient;
use crate::port::outbound::sink::ResultSink;

/// Outcome of one test in a suite.
#[derive(Debug, Clone, PartialEq)]
pub struct TestReport {
    pub name: String,
    pub outcome: RunOutcome,
    pub duration: Duration,
}

/// Outcomes of every test that was attempted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuiteSummary {
    pub reports: Vec<TestReport>,
    pub duration: Duration,
}

impl SuiteSummary {
    #[must_use]
    pub fn passed(&self) -> usize {
        self.reports
            .iter()
            .filter(|report| report.outcome.is_success())
            .count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.reports.len() - self.passed()
    }

    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failed() == 0
    }
}

/// Runs tests one at a time against one controller and one sink.
pub struct SuiteRunner<'a> {
    controller: &'a dyn ControllerClient,
    sink: &'a mut dyn ResultSink,
}

impl<'a> SuiteRunner<'a> {
    pub fn new(controller: &'a dyn ControllerClient, sink: &'a mut dyn ResultSink) -> Self {
        Self { controller, sink }
    }

    /// Authenticate, then run `tests` in order. A failed test does not stop
    /// the suite.
    pub async fn run(&mut self, tests: &[TestRunConfig]) -> Result<SuiteSummary> {
        let started = Instant::now();
        self.controller.connect().await?;
        info!(
            controller = self.controller.address(),
            tests = tests.len(),
            "Suite starting"
        );

        let mut summary = SuiteSummary::default();
        for (index, config) in tests.iter().enumerate() {
            info!(
                test = %config.name,
                test_id = %config.test_id,
                position = index + 1,
                of = tests.len(),
                "Test starting"
            );
            let test_started = Instant::now();
            let outcome = self.run_test(config).await;
            let duration = test_started.elapsed();
            match &outcome {
                RunOutcome::Completed { stop } => info!(
                    test = %config.name,
                    stop = ?stop.as_ref().map(ToString::to_string),
                    duration_s = duration.as_secs(),
                    "Test completed"
                ),
                RunOutcome::Failed(reason) => error!(
                    test = %config.name,
                    reason = %reason,
                    duration_s = duration.as_secs(),
                    "Test failed"
                ),
            }
            summary.reports.push(TestReport {
                name: config.name.clone(),
                outcome,
                duration,
            });
        }

        summary.duration = started.elapsed();
        info!(
            passed = summary.passed(),
            failed = summary.failed(),
            duration_s = summary.duration.as_secs(),
            "Suite finished"
        );
        Ok(summary)
    }

    async fn run_test(&mut self, config: &TestRunConfig) -> RunOutcome {
        let profile = match RunSetup::new(self.controller).prepare(config).await {
            Ok(profile) => profile,
            Err(err) => {
                error!(test = %config.name, error = %err, "Test setup failed");
                return RunOutcome::Failed(FailureReason::Setup(err.to_string()));
            }
        };
        if let Err(err) = self.sink.prepare(&profile.device) {
            warn!(error = %err, "Detailed report unavailable, rows will be dropped");
        }
        RunLoop::new(self.controller, &mut *self.sink, &profile)
            .run()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::controller::{sample, ScriptedController};
    use crate::testkit::profile::tput_config;
    use crate::testkit::sink::RecordingSink;

    fn unsupported_config() -> TestRunConfig {
        TestRunConfig {
            name: "cps_bw".into(),
            test_id: "t2".into(),
            test_type: "http_connections_per_second".into(),
            load_type: "bandwidth".into(),
            ..tput_config()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn setup_failure_does_not_stop_later_tests() {
        let controller = ScriptedController::new().with_statistics(vec![
            sample(100.0, 10.0, 10.0, 90.0),
            sample(100.0, 10.0, 14.0, 0.0),
        ]);
        let calls = controller.calls();
        let mut sink = RecordingSink::new();
        let recorded = sink.recorded();

        let summary = SuiteRunner::new(&controller, &mut sink)
            .run(&[unsupported_config(), tput_config()])
            .await
            .unwrap();

        assert_eq!(calls.connects(), 1);
        assert_eq!(summary.reports.len(), 2);
        assert!(matches!(
            summary.reports[0].outcome,
            RunOutcome::Failed(FailureReason::Setup(_))
        ));
        assert!(summary.reports[1].outcome.is_success());
        assert_eq!(summary.passed(), 1);
        assert!(!summary.all_passed());
        assert_eq!(recorded.devices().len(), 1);
        assert!(recorded.column("test_name").iter().all(|name| name == "tput"));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_suite_passes() {
        let controller = ScriptedController::new();
        let mut sink = RecordingSink::new();

        let summary = SuiteRunner::new(&controller, &mut sink)
            .run(&[])
            .await
            .unwrap();
        assert!(summary.all_passed());
        assert!(summary.reports.is_empty());
    }
}
