use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("unsupported manifest_version: {0}, expected 1")]
    UnsupportedVersion(u32),
    #[error("suite.run_command must contain the '{{test}}' placeholder")]
    MissingTestPlaceholder,
}

/// Harness configuration (`virtrig.toml`).
///
/// Everything has a default so an empty `[suite]` section is a valid,
/// runnable config against a stock libvirt host.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    pub manifest_version: u32,
    #[serde(default)]
    pub suite: SuiteSection,
    #[serde(default)]
    pub report: ReportSection,
    #[serde(default)]
    pub track: TrackSection,
    /// Extra permit rules appended per resource kind.
    #[serde(default)]
    pub permit: BTreeMap<String, PermitSection>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SuiteSection {
    /// Command that prints one candidate test per line.
    #[serde(default = "default_list_command")]
    pub list_command: String,
    /// Command template for one test; `{test}` is replaced with the name.
    #[serde(default = "default_run_command")]
    pub run_command: String,
    /// Per-test (and per-management-command) timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Working directory every external command starts from.
    #[serde(default)]
    pub root_dir: Option<String>,
    /// Where the selected test plan is written for reproducibility.
    #[serde(default = "default_plan_file")]
    pub plan_file: String,
}

impl Default for SuiteSection {
    fn default() -> Self {
        Self {
            list_command: default_list_command(),
            run_command: default_run_command(),
            timeout_secs: default_timeout_secs(),
            root_dir: None,
            plan_file: default_plan_file(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ReportSection {
    #[serde(default = "default_xml_path")]
    pub xml_path: String,
    #[serde(default = "default_text_path")]
    pub text_path: String,
}

impl Default for ReportSection {
    fn default() -> Self {
        Self {
            xml_path: default_xml_path(),
            text_path: default_text_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TrackSection {
    /// Host config files restored byte-for-byte on drift.
    #[serde(default = "default_tracked_files")]
    pub files: Vec<String>,
    /// Directories whose entry listings are reconciled.
    #[serde(default = "default_tracked_dirs")]
    pub dirs: Vec<String>,
    /// Mount table consulted by the mount probe.
    #[serde(default = "default_mount_table")]
    pub mount_table: String,
}

impl Default for TrackSection {
    fn default() -> Self {
        Self {
            files: default_tracked_files(),
            dirs: default_tracked_dirs(),
            mount_table: default_mount_table(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PermitSection {
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<String>,
}

fn default_list_command() -> String {
    "./run -t libvirt --list-tests".to_owned()
}

fn default_run_command() -> String {
    "./run -vt libvirt --keep-image-between-tests --tests {test}".to_owned()
}

fn default_timeout_secs() -> u64 {
    1200
}

fn default_plan_file() -> String {
    "run.test".to_owned()
}

fn default_xml_path() -> String {
    "xunit_result.xml".to_owned()
}

fn default_text_path() -> String {
    "result.txt".to_owned()
}

fn default_tracked_files() -> Vec<String> {
    vec![
        "/etc/exports".to_owned(),
        "/etc/libvirt/libvirtd.conf".to_owned(),
        "/etc/libvirt/qemu.conf".to_owned(),
    ]
}

fn default_tracked_dirs() -> Vec<String> {
    vec!["/tmp".to_owned(), "/var/lib/libvirt/images".to_owned()]
}

fn default_mount_table() -> String {
    "/etc/mtab".to_owned()
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            manifest_version: 1,
            suite: SuiteSection::default(),
            report: ReportSection::default(),
            track: TrackSection::default(),
            permit: BTreeMap::new(),
        }
    }
}

impl HarnessConfig {
    fn validate(self) -> Result<Self, ConfigError> {
        if self.manifest_version != 1 {
            return Err(ConfigError::UnsupportedVersion(self.manifest_version));
        }
        if !self.suite.run_command.contains("{test}") {
            return Err(ConfigError::MissingTestPlaceholder);
        }
        Ok(self)
    }
}

pub fn parse_config_str(input: &str) -> Result<HarnessConfig, ConfigError> {
    let config: HarnessConfig = toml::from_str(input)?;
    config.validate()
}

pub fn parse_config_file(path: impl AsRef<Path>) -> Result<HarnessConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config_str(&content)
}
