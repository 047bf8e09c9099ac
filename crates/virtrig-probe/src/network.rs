use crate::parse::{key_value_lines, table_names};
use crate::probe::{required_scalar, required_text, ResourceProbe};
use crate::virsh::Virsh;
use crate::ProbeError;
use tracing::warn;
use virtrig_state::{AttrValue, InfoRecord, PermitRules, Snapshot};

/// Virtual network probe.
pub struct NetworkProbe {
    virsh: Virsh,
    rules: PermitRules,
}

impl NetworkProbe {
    pub fn new(virsh: Virsh) -> Self {
        Self {
            virsh,
            rules: PermitRules::default(),
        }
    }
}

impl ResourceProbe for NetworkProbe {
    fn kind(&self) -> &'static str {
        "network"
    }

    fn rules(&self) -> &PermitRules {
        &self.rules
    }

    fn rules_mut(&mut self) -> &mut PermitRules {
        &mut self.rules
    }

    fn list_names(&mut self) -> Result<Vec<String>, ProbeError> {
        let output = self.virsh.run(&["net-list", "--all"])?;
        Ok(table_names(&output))
    }

    fn describe(&self, name: &str) -> Result<InfoRecord, ProbeError> {
        let info = self.virsh.run(&["net-info", name])?;
        let mut record: InfoRecord = key_value_lines(&info)
            .into_iter()
            .map(|(k, v)| (k, AttrValue::Scalar(v)))
            .collect();
        let xml = self.virsh.run(&["net-dumpxml", name, "--inactive"])?;
        record.insert("inactive xml", AttrValue::text(xml.lines()));
        Ok(record)
    }

    fn remove(&self, record: &InfoRecord) -> Result<(), ProbeError> {
        let name = required_scalar(record, "name")?;
        if record.scalar("active") == Some("yes") {
            self.virsh.run(&["net-destroy", name])?;
        }
        if record.scalar("persistent") == Some("yes") {
            self.virsh.run(&["net-undefine", name])?;
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
            self.virsh.run_with_xml("net-define", xml)?;
            if record.scalar("active") == Some("yes") {
                // net-start is flaky right after a define; one retry.
                if let Err(first) = self.virsh.run(&["net-start", name]) {
                    warn!("net-start {name} failed, retrying: {first}");
                    self.virsh.run(&["net-start", name])?;
                }
            }
        } else {
            self.virsh.run_with_xml("net-create", xml)?;
        }

        if record.scalar("autostart") == Some("yes") {
            self.virsh.run(&["net-autostart", name])?;
        }
        Ok(())
    }
}
