use crate::parse::table_names;
use crate::probe::{required_scalar, required_text, ResourceProbe};
use crate::virsh::Virsh;
use crate::ProbeError;
use virtrig_state::{AttrValue, InfoRecord, PermitRules, Snapshot};

/// Secret probe. Secrets are keyed by UUID; the XML export is all that is
/// needed to redefine one.
pub struct SecretProbe {
    virsh: Virsh,
    rules: PermitRules,
}

impl SecretProbe {
    pub fn new(virsh: Virsh) -> Self {
        Self {
            virsh,
            rules: PermitRules::default(),
        }
    }
}

impl ResourceProbe for SecretProbe {
    fn kind(&self) -> &'static str {
        "secret"
    }

    fn rules(&self) -> &PermitRules {
        &self.rules
    }

    fn rules_mut(&mut self) -> &mut PermitRules {
        &mut self.rules
    }

    fn list_names(&mut self) -> Result<Vec<String>, ProbeError> {
        let output = self.virsh.run(&["secret-list"])?;
        Ok(table_names(&output))
    }

    fn describe(&self, name: &str) -> Result<InfoRecord, ProbeError> {
        let mut record = InfoRecord::new();
        record.insert("uuid", name);
        let xml = self.virsh.run(&["secret-dumpxml", name])?;
        record.insert("xml", AttrValue::text(xml.lines()));
        Ok(record)
    }

    fn remove(&self, record: &InfoRecord) -> Result<(), ProbeError> {
        let uuid = required_scalar(record, "uuid")?;
        self.virsh.run(&["secret-undefine", uuid])?;
        Ok(())
    }

    fn restore(&self, record: &InfoRecord, live: &Snapshot) -> Result<(), ProbeError> {
        let uuid = required_scalar(record, "uuid")?;
        if let Some(existing) = live.get(uuid) {
            self.remove(existing)?;
        }
        let xml = required_text(record, "xml")?;
        self.virsh.run_with_xml("secret-define", xml)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{runner, stub_program};

    fn probe_with(dir: &std::path::Path, body: &str) -> SecretProbe {
        let program = stub_program(dir, "virsh", body);
        SecretProbe::new(Virsh::with_program(runner(), program))
    }

    #[test]
    fn lists_uuids_from_table() {
        let dir = tempfile::tempdir().unwrap();
        let mut probe = probe_with(
            dir.path(),
            r"printf ' UUID                                  Usage\n--------------------------------------------\n aaaa-bbbb-cccc                        volume\n'",
        );
        assert_eq!(probe.list_names().unwrap(), vec!["aaaa-bbbb-cccc"]);
    }

    #[test]
    fn restore_redefines_existing_secret() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("calls.log");
        let probe = probe_with(
            dir.path(),
            &format!(r#"echo "$1" >> {}"#, log.display()),
        );
        let mut record = InfoRecord::new();
        record.insert("uuid", "aaaa-bbbb");
        record.insert("xml", AttrValue::text(["<secret/>"]));

        let mut live = Snapshot::new();
        live.insert("aaaa-bbbb", record.clone());

        probe.restore(&record, &live).unwrap();
        let calls = std::fs::read_to_string(&log).unwrap();
        assert_eq!(
            calls.lines().collect::<Vec<_>>(),
            vec!["secret-undefine", "secret-define"]
        );
    }
}
