use crate::host::HostRunner;
use crate::probe::{required_scalar, ResourceProbe};
use crate::ProbeError;
use virtrig_state::{InfoRecord, PermitRules, Snapshot};

pub const DAEMON: &str = "libvirtd";
pub const SELINUX: &str = "selinux";

/// Host daemon and security-policy probe.
///
/// This probe MUST run first in both backup and check: every other probe's
/// measurements assume the management daemon is up and SELinux is in its
/// expected mode.
pub struct ServiceProbe {
    runner: HostRunner,
    systemctl: String,
    getenforce: String,
    setenforce: String,
    rules: PermitRules,
}

impl ServiceProbe {
    pub fn new(runner: HostRunner) -> Self {
        Self::with_commands(runner, "systemctl", "getenforce", "setenforce")
    }

    /// Override the management commands, used by tests to point at stubs.
    pub fn with_commands(
        runner: HostRunner,
        systemctl: impl Into<String>,
        getenforce: impl Into<String>,
        setenforce: impl Into<String>,
    ) -> Self {
        Self {
            runner,
            systemctl: systemctl.into(),
            getenforce: getenforce.into(),
            setenforce: setenforce.into(),
            rules: PermitRules::default(),
        }
    }

    fn daemon_status(&self) -> Result<&'static str, ProbeError> {
        let output = self.runner.run(&self.systemctl, &["is-active", "--quiet", DAEMON])?;
        Ok(if output.success() { "running" } else { "stopped" })
    }
}

impl ResourceProbe for ServiceProbe {
    fn kind(&self) -> &'static str {
        "service"
    }

    fn rules(&self) -> &PermitRules {
        &self.rules
    }

    fn rules_mut(&mut self) -> &mut PermitRules {
        &mut self.rules
    }

    fn list_names(&mut self) -> Result<Vec<String>, ProbeError> {
        Ok(vec![DAEMON.to_owned(), SELINUX.to_owned()])
    }

    fn describe(&self, name: &str) -> Result<InfoRecord, ProbeError> {
        let status = match name {
            DAEMON => self.daemon_status()?.to_owned(),
            SELINUX => self
                .runner
                .run_checked(&self.getenforce, &[])?
                .trim()
                .to_owned(),
            other => {
                return Err(ProbeError::Parse(format!("unknown service '{other}'")));
            }
        };
        let mut record = InfoRecord::new();
        record.insert("name", name);
        record.insert("status", status);
        Ok(record)
    }

    fn remove(&self, _record: &InfoRecord) -> Result<(), ProbeError> {
        // Removing a host service is meaningless; a caller reaching this
        // has a logic error, not a transient failure.
        Err(ProbeError::NotSupported {
            kind: "service",
            operation: "remove",
        })
    }

    fn restore(&self, record: &InfoRecord, _live: &Snapshot) -> Result<(), ProbeError> {
        let name = required_scalar(record, "name")?;
        let status = required_scalar(record, "status")?;
        match name {
            DAEMON => {
                let verb = match status {
                    "running" => "start",
                    "stopped" => "stop",
                    other => {
                        return Err(ProbeError::Parse(format!(
                            "unknown {DAEMON} status '{other}'"
                        )));
                    }
                };
                self.runner.run_checked(&self.systemctl, &[verb, DAEMON])?;
            }
            SELINUX => {
                self.runner.run_checked(&self.setenforce, &[status])?;
            }
            other => {
                return Err(ProbeError::Parse(format!("unknown service '{other}'")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{runner, stub_program};

    #[test]
    fn enumerates_daemon_before_selinux() {
        let mut probe = ServiceProbe::new(runner());
        assert_eq!(probe.list_names().unwrap(), vec![DAEMON, SELINUX]);
    }

    #[test]
    fn remove_is_a_permanent_failure() {
        let probe = ServiceProbe::new(runner());
        let err = probe.remove(&InfoRecord::new()).unwrap_err();
        assert!(err.is_permanent());
    }

    #[test]
    fn describe_reports_running_daemon_and_enforce_mode() {
        let dir = tempfile::tempdir().unwrap();
        let systemctl = stub_program(dir.path(), "systemctl", "exit 0");
        let getenforce = stub_program(dir.path(), "getenforce", "echo Enforcing");
        let setenforce = stub_program(dir.path(), "setenforce", "exit 0");
        let probe = ServiceProbe::with_commands(runner(), systemctl, getenforce, setenforce);

        let daemon = probe.describe(DAEMON).unwrap();
        assert_eq!(daemon.scalar("status"), Some("running"));
        let selinux = probe.describe(SELINUX).unwrap();
        assert_eq!(selinux.scalar("status"), Some("Enforcing"));
    }

    #[test]
    fn restore_stops_daemon_recorded_as_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("calls.log");
        let systemctl = stub_program(
            dir.path(),
            "systemctl",
            &format!(r#"echo "$*" >> {}"#, log.display()),
        );
        let probe = ServiceProbe::with_commands(runner(), systemctl, "getenforce", "setenforce");

        let mut record = InfoRecord::new();
        record.insert("name", DAEMON);
        record.insert("status", "stopped");
        probe.restore(&record, &Snapshot::new()).unwrap();

        let calls = std::fs::read_to_string(&log).unwrap();
        assert_eq!(calls.trim(), format!("stop {DAEMON}"));
    }

    #[test]
    fn restore_rejects_unknown_status() {
        let probe = ServiceProbe::new(runner());
        let mut record = InfoRecord::new();
        record.insert("name", DAEMON);
        record.insert("status", "hibernating");
        assert!(matches!(
            probe.restore(&record, &Snapshot::new()),
            Err(ProbeError::Parse(_))
        ));
    }
}
