use crate::{ReportError, TestStatus};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::debug;

struct TestCase {
    name: String,
    status: TestStatus,
    reason: Option<String>,
    duration: Duration,
    log: String,
    detail: Vec<String>,
}

struct Suite {
    timestamp: String,
    cases: Vec<TestCase>,
}

/// Accumulates per-test results and renders them as JUnit-style XML and a
/// plain-text summary. The run loop calls `save_*` after every test so a
/// partial report survives an aborted run.
#[derive(Default)]
pub struct Report {
    suites: BTreeMap<String, Suite>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.suites.is_empty()
    }

    /// Record one finished test case under the given suite (class) name.
    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        test_name: &str,
        class_name: &str,
        status: TestStatus,
        reason: Option<&str>,
        raw_log: &str,
        error_lines: &[String],
        duration: Duration,
    ) {
        let suite = self
            .suites
            .entry(class_name.to_owned())
            .or_insert_with(|| Suite {
                timestamp: chrono::Utc::now().format("%Y-%m-%d").to_string(),
                cases: Vec::new(),
            });

        let banner = match status {
            TestStatus::Pass => None,
            TestStatus::Fail => Some(format!("Test {test_name} has failed")),
            TestStatus::Timeout => Some(format!("Test {test_name} has timed out")),
            TestStatus::Error | TestStatus::Invalid => {
                Some(format!("Test {test_name} has encountered error"))
            }
            TestStatus::Skip => Some(format!("Test {test_name} is skipped")),
        };
        let mut detail: Vec<String> = banner.into_iter().collect();
        detail.extend(error_lines.iter().map(|line| filter_printable(line)));

        suite.cases.push(TestCase {
            name: test_name.to_owned(),
            status,
            reason: reason.map(str::to_owned),
            duration,
            log: filter_printable(raw_log),
            detail,
        });
    }

    /// Write the JUnit-style XML document, atomically.
    pub fn save_xml(&self, path: &Path) -> Result<(), ReportError> {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<testsuites>\n");
        for (name, suite) in &self.suites {
            let tests = suite.cases.len();
            let failures = suite
                .cases
                .iter()
                .filter(|c| matches!(c.status, TestStatus::Fail | TestStatus::Timeout))
                .count();
            let errors = suite
                .cases
                .iter()
                .filter(|c| matches!(c.status, TestStatus::Error | TestStatus::Invalid))
                .count();
            let skipped = suite
                .cases
                .iter()
                .filter(|c| c.status == TestStatus::Skip)
                .count();
            let _ = writeln!(
                out,
                "  <testsuite name=\"{}\" tests=\"{tests}\" failures=\"{failures}\" \
                 errors=\"{errors}\" skipped=\"{skipped}\" timestamp=\"{}\">",
                escape_attr(name),
                escape_attr(&suite.timestamp),
            );
            for case in &suite.cases {
                render_case(&mut out, name, case);
            }
            out.push_str("  </testsuite>\n");
        }
        out.push_str("</testsuites>\n");

        debug!("saving XML report to {}", path.display());
        write_atomic(path, &out)
    }

    /// Write the plain-text summary, atomically: case counts per outcome,
    /// with FAIL/ERROR/TIMEOUT/SKIP broken down by reason.
    pub fn save_text(&self, path: &Path) -> Result<(), ReportError> {
        let cases: Vec<&TestCase> = self.suites.values().flat_map(|s| &s.cases).collect();
        let mut out = String::new();
        for status in [
            TestStatus::Pass,
            TestStatus::Fail,
            TestStatus::Error,
            TestStatus::Timeout,
            TestStatus::Skip,
            TestStatus::Invalid,
        ] {
            let matching: Vec<&&TestCase> =
                cases.iter().filter(|c| c.status == status).collect();
            if matching.is_empty() {
                continue;
            }
            let _ = writeln!(out, "* {:3} cases {}", matching.len(), status);
            if status.is_success() && status != TestStatus::Skip {
                continue;
            }
            let mut by_reason: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
            for case in &matching {
                by_reason
                    .entry(case.reason.as_deref().unwrap_or("unknown reason"))
                    .or_default()
                    .push(&case.name);
            }
            for (reason, names) in by_reason {
                let _ = writeln!(out, "\t- {:3} caused by {reason}", names.len());
                for name in names {
                    let _ = writeln!(out, "\t\t{name}");
                }
            }
        }
        let _ = writeln!(out, "* {:3} cases in total", cases.len());

        debug!("saving text report to {}", path.display());
        write_atomic(path, &out)
    }
}

fn render_case(out: &mut String, class_name: &str, case: &TestCase) {
    let mut display_name = case.name.clone();
    if let Some(reason) = &case.reason {
        display_name.push(' ');
        display_name.push_str(reason);
    }
    let _ = write!(
        out,
        "    <testcase classname=\"{}\" name=\"{}\" time=\"{:.3}\"",
        escape_attr(class_name),
        escape_attr(&display_name),
        case.duration.as_secs_f64(),
    );
    if case.status == TestStatus::Pass && case.log.is_empty() {
        out.push_str("/>\n");
        return;
    }
    out.push_str(">\n");

    let message = case.reason.as_deref().unwrap_or("");
    let child = match case.status {
        TestStatus::Pass => None,
        TestStatus::Fail => Some(("failure", "Failure")),
        TestStatus::Timeout => Some(("failure", "Timeout")),
        TestStatus::Error | TestStatus::Invalid => Some(("failure", "Error")),
        TestStatus::Skip => Some(("skipped", "Skip")),
    };
    if let Some((tag, type_)) = child {
        let _ = writeln!(
            out,
            "      <{tag} message=\"{}\" type=\"{type_}\">{}</{tag}>",
            escape_attr(message),
            escape_text(&case.detail.join("\n")),
        );
    }
    if !case.log.is_empty() {
        let _ = writeln!(
            out,
            "      <system-out><![CDATA[{}]]></system-out>",
            escape_cdata(&case.log),
        );
    }
    out.push_str("    </testcase>\n");
}

fn write_atomic(path: &Path, content: &str) -> Result<(), ReportError> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    let mut tmp = match dir {
        Some(dir) => NamedTempFile::new_in(dir)?,
        None => NamedTempFile::new()?,
    };
    tmp.write_all(content.as_bytes())?;
    tmp.persist(path).map_err(|e| ReportError::Io(e.error))?;
    Ok(())
}

/// Drop non-printable characters from suite output; tabs and newlines stay.
fn filter_printable(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t'))
        .collect()
}

fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_cdata(s: &str) -> String {
    // A literal "]]>" would terminate the section early.
    s.replace("]]>", "]]]]><![CDATA[>")
}
