use crate::parse::{key_value_lines, table_lines, table_names};
use crate::probe::{required_scalar, required_text, ResourceProbe};
use crate::virsh::Virsh;
use crate::ProbeError;
use virtrig_state::{AttrValue, InfoRecord, PermitRules, Snapshot};

/// Storage pool probe.
///
/// Capacity counters move constantly while the pool is untouched, so both
/// the scalar `available`/`allocation` fields and the matching XML elements
/// are permitted drift.
pub struct PoolProbe {
    virsh: Virsh,
    rules: PermitRules,
}

impl PoolProbe {
    pub fn new(virsh: Virsh) -> Result<Self, ProbeError> {
        Ok(Self {
            virsh,
            rules: PermitRules::new(
                ["available", "allocation"],
                [r"^[-+]\s*<(capacity|allocation|available).*$"],
            )?,
        })
    }
}

impl ResourceProbe for PoolProbe {
    fn kind(&self) -> &'static str {
        "pool"
    }

    fn rules(&self) -> &PermitRules {
        &self.rules
    }

    fn rules_mut(&mut self) -> &mut PermitRules {
        &mut self.rules
    }

    fn list_names(&mut self) -> Result<Vec<String>, ProbeError> {
        let output = self.virsh.run(&["pool-list", "--all"])?;
        Ok(table_names(&output))
    }

    fn describe(&self, name: &str) -> Result<InfoRecord, ProbeError> {
        let info = self.virsh.run(&["pool-info", name])?;
        let mut record: InfoRecord = key_value_lines(&info)
            .into_iter()
            .map(|(k, v)| (k, AttrValue::Scalar(v)))
            .collect();
        let xml = self.virsh.run(&["pool-dumpxml", name, "--inactive"])?;
        record.insert("inactive xml", AttrValue::text(xml.lines()));
        let volumes = self.virsh.run(&["vol-list", name])?;
        record.insert("volumes", AttrValue::Text(table_lines(&volumes)));
        Ok(record)
    }

    fn remove(&self, record: &InfoRecord) -> Result<(), ProbeError> {
        let name = required_scalar(record, "name")?;
        if record.scalar("state") == Some("running") {
            self.virsh.run(&["pool-destroy", name])?;
        }
        if record.scalar("persistent") == Some("yes") {
            self.virsh.run(&["pool-undefine", name])?;
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
            self.virsh.run_with_xml("pool-define", xml)?;
            if record.scalar("state") == Some("running") {
                self.virsh.run(&["pool-start", name])?;
            }
        } else {
            self.virsh.run_with_xml("pool-create", xml)?;
        }

        if record.scalar("autostart") == Some("yes") {
            self.virsh.run(&["pool-autostart", name])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{runner, stub_program};

    fn probe_with(dir: &std::path::Path, body: &str) -> PoolProbe {
        let program = stub_program(dir, "virsh", body);
        PoolProbe::new(Virsh::with_program(runner(), program)).unwrap()
    }

    #[test]
    fn describe_captures_info_xml_and_volumes() {
        let dir = tempfile::tempdir().unwrap();
        let probe = probe_with(
            dir.path(),
            r#"case "$1" in
pool-info) printf 'Name:        default\nState:       running\nAllocation:  10G\n' ;;
pool-dumpxml) printf '<pool>\n</pool>\n' ;;
vol-list) printf ' Name   Path\n------------\n vol1   /images/vol1\n' ;;
esac"#,
        );
        let record = probe.describe("default").unwrap();
        assert_eq!(record.scalar("state"), Some("running"));
        assert_eq!(record.scalar("allocation"), Some("10G"));
        assert_eq!(record.text("volumes").unwrap(), ["vol1   /images/vol1".to_owned()]);
        assert!(record.text("inactive xml").is_some());
    }

    #[test]
    fn capacity_churn_is_permitted_by_default_rules() {
        let dir = tempfile::tempdir().unwrap();
        let probe = probe_with(dir.path(), "true");
        assert!(probe.rules().permits_key("allocation"));
        assert!(probe.rules().permits_key("available"));
        assert!(!probe.rules().permits_key("state"));
        assert!(probe
            .rules()
            .permits_lines(["-  <capacity unit='bytes'>100</capacity>"]));
    }

    #[test]
    fn restore_defines_and_starts_running_pool() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("calls.log");
        let probe = probe_with(
            dir.path(),
            &format!(r#"echo "$1" >> {}"#, log.display()),
        );
        let mut record = InfoRecord::new();
        record.insert("name", "default");
        record.insert("state", "running");
        record.insert("persistent", "yes");
        record.insert("autostart", "yes");
        record.insert("inactive xml", AttrValue::text(["<pool/>"]));

        probe.restore(&record, &Snapshot::new()).unwrap();
        let calls = std::fs::read_to_string(&log).unwrap();
        assert_eq!(
            calls.lines().collect::<Vec<_>>(),
            vec!["pool-define", "pool-start", "pool-autostart"]
        );
    }
}
