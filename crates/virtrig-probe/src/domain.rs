use crate::parse::key_value_lines;
use crate::probe::{required_scalar, required_text, ResourceProbe};
use crate::virsh::Virsh;
use crate::ProbeError;
use virtrig_state::{AttrValue, InfoRecord, PermitRules, Snapshot};

/// Virtual machine (domain) probe.
///
/// `id`, `cpu time`, and `security label` churn on every start/stop cycle
/// and are permitted; everything else in `dominfo` plus the full inactive
/// XML export is compared.
pub struct DomainProbe {
    virsh: Virsh,
    rules: PermitRules,
}

impl DomainProbe {
    pub fn new(virsh: Virsh) -> Result<Self, ProbeError> {
        Ok(Self {
            virsh,
            rules: PermitRules::new(["id", "cpu time", "security label"], [])?,
        })
    }
}

impl ResourceProbe for DomainProbe {
    fn kind(&self) -> &'static str {
        "domain"
    }

    fn rules(&self) -> &PermitRules {
        &self.rules
    }

    fn rules_mut(&mut self) -> &mut PermitRules {
        &mut self.rules
    }

    fn list_names(&mut self) -> Result<Vec<String>, ProbeError> {
        let output = self.virsh.run(&["list", "--all", "--name"])?;
        Ok(output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect())
    }

    fn describe(&self, name: &str) -> Result<InfoRecord, ProbeError> {
        let info = self.virsh.run(&["dominfo", name])?;
        let mut record: InfoRecord = key_value_lines(&info)
            .into_iter()
            .map(|(k, v)| (k, AttrValue::Scalar(v)))
            .collect();
        let xml = self.virsh.run(&["dumpxml", name, "--inactive"])?;
        record.insert("inactive xml", AttrValue::text(xml.lines()));
        Ok(record)
    }

    fn remove(&self, record: &InfoRecord) -> Result<(), ProbeError> {
        let name = required_scalar(record, "name")?;
        if record.scalar("state") != Some("shut off") {
            self.virsh.run(&["destroy", name])?;
        }
        if record.scalar("persistent") == Some("yes") {
            // Only reached when the domain is already down: a failed destroy
            // propagates above and the definition is left in place.
            self.virsh
                .run(&["undefine", name, "--snapshots-metadata", "--managed-save"])?;
        }
        Ok(())
    }

    fn restore(&self, record: &InfoRecord, live: &Snapshot) -> Result<(), ProbeError> {
        let name = required_scalar(record, "name")?;
        if let Some(existing) = live.get(name) {
            self.remove(existing)?;
        }

        let xml = required_text(record, "inactive xml")?;
        if record.scalar("persistent") == Some("yes") {
            self.virsh.run_with_xml("define", xml)?;
            if record.scalar("state") != Some("shut off") {
                self.virsh.run(&["start", name])?;
            }
        } else {
            self.virsh.run_with_xml("create", xml)?;
        }

        if record.scalar("autostart") == Some("enable") {
            self.virsh.run(&["autostart", name])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{runner, stub_program};

    fn probe_with(dir: &std::path::Path, body: &str) -> DomainProbe {
        let program = stub_program(dir, "virsh", body);
        DomainProbe::new(Virsh::with_program(runner(), program)).unwrap()
    }

    #[test]
    fn lists_all_domain_names() {
        let dir = tempfile::tempdir().unwrap();
        let mut probe = probe_with(dir.path(), "printf 'vm1\\nvm2\\n\\n'");
        assert_eq!(probe.list_names().unwrap(), vec!["vm1", "vm2"]);
    }

    #[test]
    fn describe_combines_info_and_inactive_xml() {
        let dir = tempfile::tempdir().unwrap();
        let probe = probe_with(
            dir.path(),
            r#"case "$1" in
dominfo) printf 'Id:     1\nName:   vm1\nState:  running\n' ;;
dumpxml) printf '<domain>\n</domain>\n' ;;
esac"#,
        );
        let record = probe.describe("vm1").unwrap();
        assert_eq!(record.scalar("state"), Some("running"));
        assert_eq!(record.scalar("name"), Some("vm1"));
        assert_eq!(
            record.text("inactive xml").unwrap(),
            ["<domain>".to_owned(), "</domain>".to_owned()]
        );
    }

    #[test]
    fn remove_destroys_then_undefines_persistent_domain() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("calls.log");
        let probe = probe_with(
            dir.path(),
            &format!(r#"echo "$*" >> {}"#, log.display()),
        );
        let mut record = InfoRecord::new();
        record.insert("name", "vm1");
        record.insert("state", "running");
        record.insert("persistent", "yes");
        probe.remove(&record).unwrap();

        let calls = std::fs::read_to_string(&log).unwrap();
        let lines: Vec<_> = calls.lines().collect();
        assert_eq!(
            lines,
            vec![
                "destroy vm1",
                "undefine vm1 --snapshots-metadata --managed-save",
            ]
        );
    }

    #[test]
    fn remove_stops_at_failed_destroy() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("calls.log");
        // destroy fails; any undefine would still be logged.
        let probe = probe_with(
            dir.path(),
            &format!(
                r#"echo "$*" >> {}
[ "$1" = destroy ] && exit 1
exit 0"#,
                log.display()
            ),
        );
        let mut record = InfoRecord::new();
        record.insert("name", "vm1");
        record.insert("state", "running");
        record.insert("persistent", "yes");

        let err = probe.remove(&record).unwrap_err();
        assert!(err.to_string().contains("exit status 1"));

        let calls = std::fs::read_to_string(&log).unwrap();
        assert_eq!(calls.lines().collect::<Vec<_>>(), vec!["destroy vm1"]);
    }

    #[test]
    fn remove_skips_destroy_for_shut_off_domain() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("calls.log");
        let probe = probe_with(
            dir.path(),
            &format!(r#"echo "$*" >> {}"#, log.display()),
        );
        let mut record = InfoRecord::new();
        record.insert("name", "vm1");
        record.insert("state", "shut off");
        record.insert("persistent", "yes");
        probe.remove(&record).unwrap();

        let calls = std::fs::read_to_string(&log).unwrap();
        assert!(!calls.contains("destroy"));
        assert!(calls.contains("undefine vm1"));
    }

    #[test]
    fn restore_defines_starts_and_autostarts() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("calls.log");
        let probe = probe_with(
            dir.path(),
            &format!(r#"echo "$1" >> {}"#, log.display()),
        );
        let mut record = InfoRecord::new();
        record.insert("name", "vm1");
        record.insert("state", "running");
        record.insert("persistent", "yes");
        record.insert("autostart", "enable");
        record.insert("inactive xml", AttrValue::text(["<domain/>"]));

        probe.restore(&record, &Snapshot::new()).unwrap();

        let calls = std::fs::read_to_string(&log).unwrap();
        let verbs: Vec<_> = calls.lines().collect();
        assert_eq!(verbs, vec!["define", "start", "autostart"]);
    }

    #[test]
    fn restore_removes_live_instance_first() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("calls.log");
        let probe = probe_with(
            dir.path(),
            &format!(r#"echo "$1" >> {}"#, log.display()),
        );
        let mut backup = InfoRecord::new();
        backup.insert("name", "vm1");
        backup.insert("state", "shut off");
        backup.insert("persistent", "yes");
        backup.insert("inactive xml", AttrValue::text(["<domain/>"]));

        let mut live_record = InfoRecord::new();
        live_record.insert("name", "vm1");
        live_record.insert("state", "running");
        live_record.insert("persistent", "yes");
        let mut live = Snapshot::new();
        live.insert("vm1", live_record);

        probe.restore(&backup, &live).unwrap();

        let calls = std::fs::read_to_string(&log).unwrap();
        let verbs: Vec<_> = calls.lines().collect();
        // destroy + undefine the live copy, then define; shut off, so no start
        assert_eq!(verbs, vec!["destroy", "undefine", "define"]);
    }

    #[test]
    fn restore_uses_create_for_transient_domain() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("calls.log");
        let probe = probe_with(
            dir.path(),
            &format!(r#"echo "$1" >> {}"#, log.display()),
        );
        let mut record = InfoRecord::new();
        record.insert("name", "vm1");
        record.insert("state", "running");
        record.insert("persistent", "no");
        record.insert("inactive xml", AttrValue::text(["<domain/>"]));

        probe.restore(&record, &Snapshot::new()).unwrap();
        let calls = std::fs::read_to_string(&log).unwrap();
        assert_eq!(calls.lines().collect::<Vec<_>>(), vec!["create"]);
    }
}
