use crate::record::{AttrValue, InfoRecord, Snapshot};
use crate::rules::PermitRules;
use serde::Serialize;
use similar::{ChangeTag, TextDiff};

/// Classification tag carried by every finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FindingKind {
    ResourceCreated,
    ResourceDeleted,
    AttrCreated,
    AttrDeleted,
    AttrChanged,
    InvalidValue,
    RecoveryFailed,
}

/// One human-readable drift finding.
#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub kind: FindingKind,
    pub message: String,
}

impl Finding {
    pub fn new(kind: FindingKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Structured result of diffing two snapshots of one resource kind.
///
/// `created`, `deleted`, and `changed` list the resource names that require
/// recovery; `findings` holds the ordered report lines. Permitted drift
/// contributes to neither.
#[derive(Debug, Default, Serialize)]
pub struct SnapshotDiff {
    pub findings: Vec<Finding>,
    pub created: Vec<String>,
    pub deleted: Vec<String>,
    pub changed: Vec<String>,
}

impl SnapshotDiff {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}

/// Diff a stored backup snapshot against a freshly derived one and classify
/// every difference as reportable drift or permitted noise.
///
/// Findings are appended in a fixed order: created resources, deleted
/// resources, then per-shared-resource attribute findings, with resources
/// and attributes visited in name order.
pub fn diff_snapshots(
    old: &Snapshot,
    new: &Snapshot,
    kind: &str,
    rules: &PermitRules,
) -> SnapshotDiff {
    let mut diff = SnapshotDiff::default();

    for name in new.names() {
        if !old.contains(name) {
            diff.findings.push(Finding::new(
                FindingKind::ResourceCreated,
                format!("Created {kind}(s): {name}"),
            ));
            diff.created.push(name.clone());
        }
    }

    for name in old.names() {
        if !new.contains(name) {
            diff.findings.push(Finding::new(
                FindingKind::ResourceDeleted,
                format!("Deleted {kind}(s): {name}"),
            ));
            diff.deleted.push(name.clone());
        }
    }

    for (name, bak) in old.0.iter() {
        let Some(cur) = new.get(name) else {
            continue;
        };
        if diff_records(bak, cur, kind, name, rules, &mut diff.findings) {
            diff.changed.push(name.clone());
        }
    }

    diff
}

/// Attribute-level diff of one shared resource. Returns true when at least
/// one non-permitted change was found (the resource then requires a
/// whole-record restore).
fn diff_records(
    bak: &InfoRecord,
    cur: &InfoRecord,
    kind: &str,
    name: &str,
    rules: &PermitRules,
    findings: &mut Vec<Finding>,
) -> bool {
    let mut changed = false;

    for key in cur.keys() {
        if bak.get(key).is_none() {
            findings.push(Finding::new(
                FindingKind::AttrCreated,
                format!("Created key(s) in {kind} {name}: {key}"),
            ));
            changed = true;
        }
    }

    for key in bak.keys() {
        if cur.get(key).is_none() {
            findings.push(Finding::new(
                FindingKind::AttrDeleted,
                format!("Deleted key(s) in {kind} {name}: {key}"),
            ));
            changed = true;
        }
    }

    for (key, bak_value) in bak.iter() {
        let Some(cur_value) = cur.get(key) else {
            continue;
        };
        match (bak_value, cur_value) {
            (AttrValue::Scalar(before), AttrValue::Scalar(after)) => {
                if !rules.permits_key(key) && before != after {
                    findings.push(Finding::new(
                        FindingKind::AttrChanged,
                        format!("{kind} {name}: {key} changed: {before} -> {after}"),
                    ));
                    changed = true;
                }
            }
            (AttrValue::Text(before), AttrValue::Text(after)) => {
                let delta = changed_lines(before, after);
                if !delta.is_empty() && !rules.permits_lines(delta.iter().map(String::as_str)) {
                    let body = delta.join("\n");
                    findings.push(Finding::new(
                        FindingKind::AttrChanged,
                        format!("{kind} {name}: \"{key}\" changed:\n{body}"),
                    ));
                    changed = true;
                }
            }
            (AttrValue::Entries(before), AttrValue::Entries(after)) => {
                if diff_entries(before, after, kind, name, key, rules, findings) {
                    changed = true;
                }
            }
            (before, after) => {
                findings.push(Finding::new(
                    FindingKind::InvalidValue,
                    format!(
                        "{kind} {name}: {key}: invalid value shape: {} -> {}",
                        before.shape(),
                        after.shape()
                    ),
                ));
                changed = true;
            }
        }
    }

    changed
}

/// Entry-map diff (directory listings). Entry names behave like attribute
/// keys: a permitted entry name is ignored in all three directions.
fn diff_entries(
    before: &std::collections::BTreeMap<String, String>,
    after: &std::collections::BTreeMap<String, String>,
    kind: &str,
    name: &str,
    key: &str,
    rules: &PermitRules,
    findings: &mut Vec<Finding>,
) -> bool {
    let mut changed = false;

    for entry in after.keys() {
        if !before.contains_key(entry) && !rules.permits_key(entry) {
            findings.push(Finding::new(
                FindingKind::AttrCreated,
                format!("{kind} {name}: {key}: entry created: {entry}"),
            ));
            changed = true;
        }
    }
    for entry in before.keys() {
        if !after.contains_key(entry) && !rules.permits_key(entry) {
            findings.push(Finding::new(
                FindingKind::AttrDeleted,
                format!("{kind} {name}: {key}: entry deleted: {entry}"),
            ));
            changed = true;
        }
    }
    for (entry, old_value) in before {
        if let Some(new_value) = after.get(entry) {
            if old_value != new_value && !rules.permits_key(entry) {
                findings.push(Finding::new(
                    FindingKind::AttrChanged,
                    format!("{kind} {name}: {key}: entry changed: {entry}"),
                ));
                changed = true;
            }
        }
    }

    changed
}

/// Line-based diff of two ordered text attributes, reduced to the added and
/// removed lines with `+`/`-` prefixes (the form permit patterns match on).
fn changed_lines(before: &[String], after: &[String]) -> Vec<String> {
    let old_text = before.join("\n");
    let new_text = after.join("\n");
    let diff = TextDiff::from_lines(&old_text, &new_text);

    let mut lines = Vec::new();
    for change in diff.iter_all_changes() {
        let prefix = match change.tag() {
            ChangeTag::Delete => '-',
            ChangeTag::Insert => '+',
            ChangeTag::Equal => continue,
        };
        let value = change.value().trim_end_matches('\n');
        lines.push(format!("{prefix}{value}"));
    }
    lines
}
