use crate::CoreError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use virtrig_probe::{HostRunner, ProbeError};

/// Test selection knobs, straight from the CLI.
#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    /// Keep only tests containing at least one of these substrings.
    pub only: Vec<String>,
    /// Drop tests containing any of these substrings.
    pub skip: Vec<String>,
    /// Keep only the first test of each module.
    pub smoke: bool,
    /// When set, take the test list from this file instead of the suite.
    pub whitelist: Option<PathBuf>,
    /// Exact test names to exclude, one per line.
    pub blacklist: Option<PathBuf>,
}

/// The ordered list of tests selected for one run.
#[derive(Debug, Clone)]
pub struct TestPlan {
    tests: Vec<String>,
}

impl TestPlan {
    pub fn from_tests(tests: Vec<String>) -> Self {
        Self { tests }
    }

    /// Assemble the plan: enumerate candidates (suite listing or whitelist
    /// file), then apply only/skip/blacklist filtering.
    pub fn assemble(
        list_command: &str,
        runner: &HostRunner,
        options: &PlanOptions,
    ) -> Result<Self, CoreError> {
        let mut tests = match &options.whitelist {
            Some(path) => read_tests_file(path)?,
            None => list_suite_tests(list_command, runner, options.smoke)?,
        };

        if !options.only.is_empty() {
            tests.retain(|t| options.only.iter().any(|item| t.contains(item)));
        }
        if !options.skip.is_empty() {
            tests.retain(|t| !options.skip.iter().any(|item| t.contains(item)));
        }
        if let Some(path) = &options.blacklist {
            let black = read_tests_file(path)?;
            tests.retain(|t| !black.contains(t));
        }

        info!("selected {} test(s)", tests.len());
        Ok(Self { tests })
    }

    pub fn tests(&self) -> &[String] {
        &self.tests
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Write the selected plan, one test per line, so a run can be
    /// reproduced later.
    pub fn write(&self, path: &Path) -> Result<(), CoreError> {
        let mut content = self.tests.join("\n");
        if !content.is_empty() {
            content.push('\n');
        }
        fs::write(path, content)?;
        Ok(())
    }
}

/// Module a test belongs to, with the suite's fixed name prefixes peeled
/// off. Used for smoke-mode deduplication and as the report suite name.
pub fn module_name(test: &str) -> &str {
    let mut name = test;
    for prefix in ["type_specific.", "io-github-autotest-libvirt.", "virsh."] {
        if let Some(rest) = name.strip_prefix(prefix) {
            name = rest;
        }
    }
    name.split('.').next().unwrap_or(name)
}

/// Run the suite's list command and parse one test name per numbered line.
fn list_suite_tests(
    list_command: &str,
    runner: &HostRunner,
    smoke: bool,
) -> Result<Vec<String>, CoreError> {
    debug!("listing tests: {list_command}");
    let output = runner.run_shell(list_command)?;
    if !output.success() {
        return Err(CoreError::Probe(ProbeError::CommandFailed {
            command: list_command.to_owned(),
            status: output.status,
            stderr: output.stderr,
        }));
    }

    let mut tests = Vec::new();
    let mut modules_seen = std::collections::BTreeSet::new();
    for line in output.stdout.lines() {
        let Some(test) = parse_listing_line(line) else {
            continue;
        };
        if smoke && !modules_seen.insert(module_name(test).to_owned()) {
            continue;
        }
        tests.push(test.to_owned());
    }
    Ok(tests)
}

/// Listing lines look like `12 virsh.start.positive (requires root)`; the
/// leading index and the root marker are noise.
fn parse_listing_line(line: &str) -> Option<&str> {
    let line = line.trim_end();
    if !line.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        return None;
    }
    let rest = line.trim_start_matches(|c: char| c.is_ascii_digit());
    let test = rest.strip_prefix(' ')?;
    Some(test.strip_suffix(" (requires root)").unwrap_or(test))
}

/// One test per line; blank lines and `#` comments are ignored.
fn read_tests_file(path: &Path) -> Result<Vec<String>, CoreError> {
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_owned)
        .collect())
}
