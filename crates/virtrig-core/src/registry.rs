use crate::{recovery, CoreError};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use virtrig_probe::dir::DirProbe;
use virtrig_probe::domain::DomainProbe;
use virtrig_probe::file::FileProbe;
use virtrig_probe::mount::MountProbe;
use virtrig_probe::network::NetworkProbe;
use virtrig_probe::pool::PoolProbe;
use virtrig_probe::secret::SecretProbe;
use virtrig_probe::service::ServiceProbe;
use virtrig_probe::{HostRunner, ResourceProbe, Virsh};
use virtrig_state::{diff_snapshots, Finding, FindingKind, HarnessConfig, Snapshot};

struct ProbeEntry {
    probe: Box<dyn ResourceProbe>,
    backup: Option<Snapshot>,
}

/// Aggregated result of one post-test verification pass over all kinds.
#[derive(Debug, Default, Serialize)]
pub struct CheckReport {
    pub findings: Vec<Finding>,
    /// True when any kind had non-permitted drift.
    pub dirty: bool,
    /// Kinds whose current state could not be derived at all.
    pub compromised: Vec<String>,
}

impl CheckReport {
    pub fn is_clean(&self) -> bool {
        !self.dirty && self.compromised.is_empty()
    }
}

/// Ordered collection of probes with their stored backup snapshots.
///
/// The order is fixed at construction and every pass visits the probes in
/// that order. The service probe must come first: every other kind's
/// measurement assumes the management daemon is up and SELinux is in its
/// expected mode.
pub struct StateRegistry {
    entries: Vec<ProbeEntry>,
}

impl StateRegistry {
    pub fn with_probes(probes: Vec<Box<dyn ResourceProbe>>) -> Self {
        Self {
            entries: probes
                .into_iter()
                .map(|probe| ProbeEntry {
                    probe,
                    backup: None,
                })
                .collect(),
        }
    }

    /// Build the production probe list from the harness config, with any
    /// configured extra permit rules applied per kind.
    pub fn from_config(config: &HarnessConfig) -> Result<Self, CoreError> {
        let timeout = Duration::from_secs(config.suite.timeout_secs);
        let cwd = config.suite.root_dir.as_ref().map(PathBuf::from);
        let runner = HostRunner::new(cwd, timeout);

        let files = config.track.files.iter().map(PathBuf::from).collect();
        let dirs: Vec<PathBuf> = config.track.dirs.iter().map(PathBuf::from).collect();

        let mut probes: Vec<Box<dyn ResourceProbe>> = vec![
            Box::new(ServiceProbe::new(runner.clone())),
            Box::new(FileProbe::new(files)),
            Box::new(DirProbe::new(dirs, &config.track.mount_table, runner.clone())?),
            Box::new(DomainProbe::new(Virsh::new(runner.clone()))?),
            Box::new(NetworkProbe::new(Virsh::new(runner.clone()))),
            Box::new(PoolProbe::new(Virsh::new(runner.clone()))?),
            Box::new(SecretProbe::new(Virsh::new(runner.clone()))),
            Box::new(MountProbe::new(&config.track.mount_table, runner)),
        ];

        for probe in &mut probes {
            if let Some(extra) = config.permit.get(probe.kind()) {
                let rules = probe.rules_mut();
                for key in &extra.keys {
                    rules.add_key(key);
                }
                for pattern in &extra.patterns {
                    rules.add_pattern(pattern).map_err(CoreError::State)?;
                }
            }
        }

        Ok(Self::with_probes(probes))
    }

    /// Kind names in registry order.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.probe.kind()).collect()
    }

    /// Snapshot every kind in order and store the result as the baseline
    /// for later checks. A read failure here is fatal: a run must not start
    /// from a baseline with holes in it.
    pub fn backup(&mut self) -> Result<(), CoreError> {
        for entry in &mut self.entries {
            info!("backing up {} state", entry.probe.kind());
            entry.backup = Some(entry.probe.snapshot()?);
        }
        Ok(())
    }

    /// Take a fresh snapshot of every kind without touching the baseline.
    pub fn snapshot_all(&mut self) -> Result<BTreeMap<String, Snapshot>, CoreError> {
        let mut all = BTreeMap::new();
        for entry in &mut self.entries {
            all.insert(entry.probe.kind().to_owned(), entry.probe.snapshot()?);
        }
        Ok(all)
    }

    /// Diff every kind's current state against its baseline, optionally
    /// driving recovery. A read failure marks the kind compromised and the
    /// remaining kinds are still checked.
    pub fn check(&mut self, recover: bool) -> CheckReport {
        let mut report = CheckReport::default();
        for entry in &mut self.entries {
            let kind = entry.probe.kind();
            let Some(backup) = entry.backup.clone() else {
                warn!("check called before backup for kind {kind}, skipping");
                continue;
            };
            let current = match entry.probe.snapshot() {
                Ok(snap) => snap,
                Err(e) => {
                    warn!("cannot derive current {kind} state: {e}");
                    report.findings.push(Finding::new(
                        FindingKind::InvalidValue,
                        format!("{kind} state could not be derived: {e}"),
                    ));
                    report.compromised.push(kind.to_owned());
                    continue;
                }
            };

            let diff = diff_snapshots(&backup, &current, kind, entry.probe.rules());
            if diff.is_clean() {
                continue;
            }
            report.dirty = true;
            report.findings.extend(diff.findings.iter().cloned());
            if recover {
                recovery::recover(
                    entry.probe.as_ref(),
                    &backup,
                    &current,
                    &diff,
                    &mut report.findings,
                );
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use virtrig_probe::MockProbe;

    fn registry_of(probes: Vec<MockProbe>) -> StateRegistry {
        StateRegistry::with_probes(
            probes
                .into_iter()
                .map(|p| Box::new(p) as Box<dyn ResourceProbe>)
                .collect(),
        )
    }

    #[test]
    fn from_config_orders_service_first() {
        let config = HarnessConfig::default();
        let registry = StateRegistry::from_config(&config).unwrap();
        assert_eq!(
            registry.kinds(),
            vec![
                "service",
                "file",
                "directory",
                "domain",
                "network",
                "pool",
                "secret",
                "mount"
            ]
        );
    }

    #[test]
    fn config_permit_extras_reach_probe_rules() {
        let config = virtrig_state::parse_config_str(
            r#"
manifest_version = 1
[permit.domain]
keys = ["memory"]
"#,
        )
        .unwrap();
        let registry = StateRegistry::from_config(&config).unwrap();
        let domain = registry
            .entries
            .iter()
            .find(|e| e.probe.kind() == "domain")
            .unwrap();
        assert!(domain.probe.rules().permits_key("memory"));
        assert!(domain.probe.rules().permits_key("id"));
    }

    #[test]
    fn clean_host_yields_clean_report() {
        let probe = MockProbe::new("domain");
        probe.insert_resource("vm1", &[("state", "running")]);
        let mut registry = registry_of(vec![probe]);
        registry.backup().unwrap();
        let report = registry.check(false);
        assert!(report.is_clean());
        assert!(report.findings.is_empty());
    }

    #[test]
    fn created_resource_is_reported_and_removed() {
        let probe = MockProbe::new("domain");
        let handle = probe.clone();
        let mut registry = registry_of(vec![probe]);
        registry.backup().unwrap();

        handle.insert_resource("vm1", &[("state", "running")]);
        let report = registry.check(true);

        assert!(report.dirty);
        assert_eq!(report.findings[0].message, "Created domain(s): vm1");
        assert_eq!(handle.calls(), vec!["remove vm1"]);
        assert!(!handle.contains("vm1"));
    }

    #[test]
    fn deleted_resource_is_restored() {
        let probe = MockProbe::new("network");
        probe.insert_resource("default", &[("active", "yes")]);
        let handle = probe.clone();
        let mut registry = registry_of(vec![probe]);
        registry.backup().unwrap();

        handle.delete_resource("default");
        let report = registry.check(true);

        assert!(report.dirty);
        assert_eq!(report.findings[0].message, "Deleted network(s): default");
        assert!(handle.contains("default"));
    }

    #[test]
    fn changed_resource_gets_whole_record_restore() {
        let probe = MockProbe::new("domain");
        probe.insert_resource("vm1", &[("state", "shut off")]);
        let handle = probe.clone();
        let mut registry = registry_of(vec![probe]);
        registry.backup().unwrap();

        handle.set_attr("vm1", "state", "running");
        let report = registry.check(true);

        assert!(report.dirty);
        assert_eq!(handle.calls(), vec!["restore vm1"]);
        assert_eq!(
            handle.live_record("vm1").unwrap().scalar("state"),
            Some("shut off")
        );
    }

    #[test]
    fn recovered_host_passes_the_next_check() {
        let probe = MockProbe::new("pool");
        probe.insert_resource("default", &[("state", "running")]);
        let handle = probe.clone();
        let mut registry = registry_of(vec![probe]);
        registry.backup().unwrap();

        handle.set_attr("default", "state", "inactive");
        handle.insert_resource("leak", &[]);
        assert!(registry.check(true).dirty);
        assert!(registry.check(false).is_clean());
    }

    #[test]
    fn restore_failure_becomes_finding_and_later_kinds_still_run() {
        let broken = MockProbe::new("network").fail_restore("exit status 1");
        broken.insert_resource("net1", &[("active", "yes")]);
        let broken_handle = broken.clone();

        let healthy = MockProbe::new("pool");
        healthy.insert_resource("default", &[]);
        let healthy_handle = healthy.clone();

        let mut registry = registry_of(vec![broken, healthy]);
        registry.backup().unwrap();

        broken_handle.delete_resource("net1");
        healthy_handle.delete_resource("default");
        let report = registry.check(true);

        let recover_failures: Vec<_> = report
            .findings
            .iter()
            .filter(|f| f.kind == FindingKind::RecoveryFailed)
            .collect();
        assert_eq!(recover_failures.len(), 1);
        assert!(recover_failures[0].message.starts_with("Recover is failed:"));
        assert!(recover_failures[0].message.contains("exit status 1"));
        // The failure did not stop the pool probe's recovery.
        assert!(healthy_handle.contains("default"));
    }

    #[test]
    fn unreadable_kind_is_compromised_but_others_still_checked() {
        let probe = MockProbe::new("secret");
        probe.insert_resource("uuid-1", &[]);
        let ok = MockProbe::new("mount");
        ok.insert_resource("/mnt", &[]);
        let ok_handle = ok.clone();

        let mut registry = registry_of(vec![probe.clone(), ok]);
        registry.backup().unwrap();

        let broken = probe.fail_list("connection refused");
        broken.insert_resource("uuid-2", &[]);
        ok_handle.insert_resource("/mnt/leak", &[]);
        let report = registry.check(false);

        assert_eq!(report.compromised, vec!["secret"]);
        assert!(report.dirty);
        assert!(report
            .findings
            .iter()
            .any(|f| f.message == "Created mount(s): /mnt/leak"));
    }

    #[test]
    fn permitted_drift_triggers_no_recovery() {
        let rules = virtrig_state::PermitRules::new(["allocation"], []).unwrap();
        let probe = MockProbe::new("pool").with_rules(rules);
        probe.insert_resource("default", &[("allocation", "10G")]);
        let handle = probe.clone();
        let mut registry = registry_of(vec![probe]);
        registry.backup().unwrap();

        handle.set_attr("default", "allocation", "12G");
        let report = registry.check(true);

        assert!(report.is_clean());
        assert!(handle.calls().is_empty());
    }
}
