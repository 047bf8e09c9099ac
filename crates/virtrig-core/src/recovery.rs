use tracing::{info, warn};
use virtrig_probe::ResourceProbe;
use virtrig_state::{Finding, FindingKind, Snapshot, SnapshotDiff};

/// Drive one kind back to its baseline after a dirty check.
///
/// Created resources are removed, deleted and changed ones are restored
/// from the backup record (whole-record restore; the probe decides how to
/// reconcile against what currently exists). Every probe failure is caught,
/// logged, and appended as a `RecoveryFailed` finding so one stuck resource
/// never blocks the rest of recovery.
pub fn recover(
    probe: &dyn ResourceProbe,
    backup: &Snapshot,
    current: &Snapshot,
    diff: &SnapshotDiff,
    findings: &mut Vec<Finding>,
) {
    let kind = probe.kind();

    for name in &diff.created {
        let Some(record) = current.get(name) else {
            continue;
        };
        info!("removing leaked {kind} '{name}'");
        if let Err(e) = probe.remove(record) {
            warn!("failed to remove {kind} '{name}': {e}");
            findings.push(Finding::new(
                FindingKind::RecoveryFailed,
                format!("Remove is failed: {e}"),
            ));
        }
    }

    for name in diff.deleted.iter().chain(diff.changed.iter()) {
        let Some(record) = backup.get(name) else {
            continue;
        };
        info!("restoring {kind} '{name}' from backup");
        if let Err(e) = probe.restore(record, current) {
            warn!("failed to restore {kind} '{name}': {e}");
            findings.push(Finding::new(
                FindingKind::RecoveryFailed,
                format!("Recover is failed: {e}"),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use virtrig_probe::{MockProbe, ResourceProbe};
    use virtrig_state::{diff_snapshots, PermitRules};

    #[test]
    fn remove_failure_does_not_stop_restores() {
        let probe = MockProbe::new("domain").fail_remove("device busy");
        probe.insert_resource("old", &[("state", "running")]);
        let mut backup_probe = probe.clone();
        let backup = backup_probe.snapshot().unwrap();

        // One leaked domain (remove will fail) and one deleted domain.
        probe.insert_resource("leak", &[]);
        probe.delete_resource("old");
        let current = probe.clone().snapshot().unwrap();

        let diff = diff_snapshots(&backup, &current, "domain", &PermitRules::default());
        let mut findings = Vec::new();
        recover(&probe, &backup, &current, &diff, &mut findings);

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, FindingKind::RecoveryFailed);
        assert!(findings[0].message.starts_with("Remove is failed:"));
        // The deleted domain was still restored.
        assert!(probe.contains("old"));
    }

    #[test]
    fn one_failed_restore_does_not_stop_the_next() {
        let probe = MockProbe::new("network");
        probe.insert_resource("net1", &[]);
        probe.insert_resource("net2", &[]);
        let backup = probe.clone().snapshot().unwrap();

        let probe = probe.fail_restore("exit status 1");
        probe.delete_resource("net1");
        probe.delete_resource("net2");
        let current = probe.clone().snapshot().unwrap();

        let diff = diff_snapshots(&backup, &current, "network", &PermitRules::default());
        let mut findings = Vec::new();
        recover(&probe, &backup, &current, &diff, &mut findings);

        // Both restores were attempted and both reported.
        assert_eq!(probe.calls(), vec!["restore net1", "restore net2"]);
        assert_eq!(findings.len(), 2);
        assert!(findings
            .iter()
            .all(|f| f.message.contains("exit status 1")));
    }
}
