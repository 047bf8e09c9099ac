use crate::plan::{module_name, TestPlan};
use crate::registry::StateRegistry;
use crate::{concurrency, CoreError};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use virtrig_probe::{HostRunner, ProbeError};
use virtrig_report::{Report, TestStatus};
use virtrig_state::HarnessConfig;

/// Everything known about one finished test: the suite verdict, the
/// post-test host check, and the captured output.
#[derive(Debug)]
pub struct TestOutcome {
    pub test: String,
    pub status: TestStatus,
    /// True when the post-test check found non-permitted drift.
    pub dirty: bool,
    pub reason: Option<String>,
    pub duration: Duration,
    pub stdout: String,
    pub stderr: String,
    /// Drift findings, one `DIFF|`-prefixed line each.
    pub diff_lines: Vec<String>,
}

impl TestOutcome {
    fn new(test: &str) -> Self {
        Self {
            test: test.to_owned(),
            status: TestStatus::Invalid,
            dirty: false,
            reason: None,
            duration: Duration::ZERO,
            stdout: String::new(),
            stderr: String::new(),
            diff_lines: Vec::new(),
        }
    }
}

/// The batch driver: backup once, then run each planned test, verify the
/// host came back clean, recover drift, and persist the report after every
/// test so an aborted run still leaves usable results.
pub struct Harness {
    config: HarnessConfig,
    registry: StateRegistry,
    runner: HostRunner,
    report: Report,
}

impl Harness {
    pub fn new(config: HarnessConfig) -> Result<Self, CoreError> {
        let registry = StateRegistry::from_config(&config)?;
        Ok(Self::with_registry(config, registry))
    }

    /// Harness over an explicit registry, used by tests to substitute mock
    /// probes.
    pub fn with_registry(config: HarnessConfig, registry: StateRegistry) -> Self {
        let runner = HostRunner::new(
            config.suite.root_dir.as_ref().map(PathBuf::from),
            Duration::from_secs(config.suite.timeout_secs),
        );
        Self {
            config,
            registry,
            runner,
            report: Report::new(),
        }
    }

    pub fn runner(&self) -> &HostRunner {
        &self.runner
    }

    pub fn registry_mut(&mut self) -> &mut StateRegistry {
        &mut self.registry
    }

    /// Run the whole plan. Returns the per-test outcomes; the report files
    /// are saved after every test and once more on the way out.
    pub fn run(
        &mut self,
        plan: &TestPlan,
        need_check: bool,
        recover: bool,
    ) -> Result<Vec<TestOutcome>, CoreError> {
        self.registry.backup()?;

        let total = plan.len();
        let mut outcomes = Vec::with_capacity(total);
        for (idx, test) in plan.tests().iter().enumerate() {
            if concurrency::shutdown_requested() {
                warn!("shutdown requested, stopping before test {}", idx + 1);
                break;
            }
            info!("({}/{total}) {test}", idx + 1);

            let mut outcome = self.run_one(test);
            if need_check {
                let check = self.registry.check(recover);
                if !check.is_clean() {
                    outcome.dirty = true;
                    for finding in &check.findings {
                        for line in finding.message.lines() {
                            outcome.diff_lines.push(format!("DIFF|{line}"));
                        }
                    }
                }
            }
            info!(
                "result: {}{} {:.2}s",
                outcome.status,
                if outcome.dirty { " DIFF" } else { "" },
                outcome.duration.as_secs_f64()
            );

            self.record(&outcome);
            self.save_report();
            outcomes.push(outcome);
        }

        self.save_report();
        Ok(outcomes)
    }

    /// Run one test through the configured suite command and parse its
    /// verdict. Never propagates: whatever happens becomes an outcome.
    pub fn run_one(&self, test: &str) -> TestOutcome {
        let command = self.config.suite.run_command.replace("{test}", test);
        let mut outcome = TestOutcome::new(test);

        match self.runner.run_shell(&command) {
            Ok(output) => {
                // The suite prints one progress line per test, e.g.
                // "(1/1) virsh.start.positive PASS".
                for line in output.stdout.lines() {
                    if line.starts_with("(1/1)") {
                        if let Some(token) = line.split_whitespace().nth(2) {
                            outcome.status =
                                TestStatus::parse(token).unwrap_or(TestStatus::Invalid);
                        }
                    }
                }
                if !matches!(outcome.status, TestStatus::Pass | TestStatus::Skip) {
                    outcome.reason = output
                        .stderr
                        .lines()
                        .find(|line| line.contains("ERROR|"))
                        .map(str::to_owned);
                }
                outcome.duration = output.duration;
                outcome.stdout = output.stdout;
                outcome.stderr = output.stderr;
            }
            Err(ProbeError::Timeout { secs, .. }) => {
                outcome.status = TestStatus::Timeout;
                outcome.reason = Some(format!("timed out after {secs}s"));
                outcome.duration = Duration::from_secs(secs);
            }
            Err(e) => {
                warn!("failed to run test {test}: {e}");
                outcome.status = TestStatus::Invalid;
                outcome.reason = Some(e.to_string());
            }
        }
        outcome
    }

    fn record(&mut self, outcome: &TestOutcome) {
        let error_lines: Vec<String> = outcome
            .stderr
            .lines()
            .filter(|line| line.contains("ERROR|"))
            .map(str::to_owned)
            .collect();

        let mut log = outcome.stderr.clone();
        if matches!(outcome.status, TestStatus::Invalid | TestStatus::Timeout) {
            log.push_str(&outcome.stdout);
        }
        for line in &outcome.diff_lines {
            log.push_str(line);
            log.push('\n');
        }

        let reason = match (&outcome.reason, outcome.dirty) {
            (Some(reason), true) => Some(format!("{reason} DIFF")),
            (Some(reason), false) => Some(reason.clone()),
            (None, true) => Some("DIFF".to_owned()),
            (None, false) => None,
        };

        self.report.update(
            &outcome.test,
            module_name(&outcome.test),
            outcome.status,
            reason.as_deref(),
            &log,
            &error_lines,
            outcome.duration,
        );
    }

    /// Best-effort persistence; a full disk must not kill the run.
    fn save_report(&self) {
        if let Err(e) = self.report.save_xml(Path::new(&self.config.report.xml_path)) {
            warn!("failed to save XML report: {e}");
        }
        if let Err(e) = self
            .report
            .save_text(Path::new(&self.config.report.text_path))
        {
            warn!("failed to save text report: {e}");
        }
    }
}
