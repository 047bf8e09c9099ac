//! Test result reporting: a JUnit-style XML file for CI consumption and a
//! plain-text summary grouped by outcome and failure reason.

mod report;

pub use report::Report;

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of one test case, as reported by the suite runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TestStatus {
    Pass,
    Fail,
    Error,
    Skip,
    Timeout,
    Invalid,
}

impl TestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TestStatus::Pass => "PASS",
            TestStatus::Fail => "FAIL",
            TestStatus::Error => "ERROR",
            TestStatus::Skip => "SKIP",
            TestStatus::Timeout => "TIMEOUT",
            TestStatus::Invalid => "INVALID",
        }
    }

    /// Parse a status token from suite runner output.
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "PASS" => Some(TestStatus::Pass),
            "FAIL" => Some(TestStatus::Fail),
            "ERROR" => Some(TestStatus::Error),
            "SKIP" => Some(TestStatus::Skip),
            "TIMEOUT" => Some(TestStatus::Timeout),
            "INVALID" => Some(TestStatus::Invalid),
            _ => None,
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, TestStatus::Pass | TestStatus::Skip)
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_tokens_round_trip() {
        for status in [
            TestStatus::Pass,
            TestStatus::Fail,
            TestStatus::Error,
            TestStatus::Skip,
            TestStatus::Timeout,
            TestStatus::Invalid,
        ] {
            assert_eq!(TestStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TestStatus::parse("CRASHED"), None);
    }

    #[test]
    fn pass_and_skip_count_as_success() {
        assert!(TestStatus::Pass.is_success());
        assert!(TestStatus::Skip.is_success());
        assert!(!TestStatus::Timeout.is_success());
    }
}
