use crate::host::HostRunner;
use crate::probe::{required_scalar, ResourceProbe};
use crate::ProbeError;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::warn;
use virtrig_state::{InfoRecord, PermitRules, Snapshot};

/// One row of the mount table: the fixed six-column format of
/// `/etc/mtab` / fstab-style files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub src: String,
    pub mount_point: String,
    pub fstype: String,
    pub options: String,
    pub dump: String,
    pub order: String,
}

/// Parse a mount table; malformed lines are skipped with a warning, never
/// fatal.
pub fn parse_mount_table(content: &str) -> Vec<MountEntry> {
    let mut entries = Vec::new();
    for line in content.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 6 {
            if !line.trim().is_empty() {
                warn!("skipping malformed mount table line: {line}");
            }
            continue;
        }
        entries.push(MountEntry {
            src: fields[0].to_owned(),
            mount_point: fields[1].to_owned(),
            fstype: fields[2].to_owned(),
            options: fields[3].to_owned(),
            dump: fields[4].to_owned(),
            order: fields[5].to_owned(),
        });
    }
    entries
}

/// Mount-table probe: resources are mount points.
///
/// Rows parsed by `list_names` are kept in an instance field for the
/// following `describe` calls; the cache is rebuilt on every enumeration.
pub struct MountProbe {
    table: PathBuf,
    runner: HostRunner,
    entries: BTreeMap<String, MountEntry>,
    rules: PermitRules,
}

impl MountProbe {
    pub fn new(table: impl Into<PathBuf>, runner: HostRunner) -> Self {
        Self {
            table: table.into(),
            runner,
            entries: BTreeMap::new(),
            rules: PermitRules::default(),
        }
    }
}

impl ResourceProbe for MountProbe {
    fn kind(&self) -> &'static str {
        "mount"
    }

    fn rules(&self) -> &PermitRules {
        &self.rules
    }

    fn rules_mut(&mut self) -> &mut PermitRules {
        &mut self.rules
    }

    fn list_names(&mut self) -> Result<Vec<String>, ProbeError> {
        let content = std::fs::read_to_string(&self.table)?;
        self.entries = parse_mount_table(&content)
            .into_iter()
            .map(|entry| (entry.mount_point.clone(), entry))
            .collect();
        Ok(self.entries.keys().cloned().collect())
    }

    fn describe(&self, name: &str) -> Result<InfoRecord, ProbeError> {
        let entry = self.entries.get(name).ok_or_else(|| {
            ProbeError::Parse(format!("mount point '{name}' not in parsed table"))
        })?;
        let mut record = InfoRecord::new();
        record.insert("src", entry.src.clone());
        record.insert("mount_point", entry.mount_point.clone());
        record.insert("fstype", entry.fstype.clone());
        record.insert("options", entry.options.clone());
        record.insert("dump", entry.dump.clone());
        record.insert("order", entry.order.clone());
        Ok(record)
    }

    fn remove(&self, record: &InfoRecord) -> Result<(), ProbeError> {
        let mount_point = required_scalar(record, "mount_point")?;
        self.runner.run_checked("umount", &[mount_point])?;
        Ok(())
    }

    fn restore(&self, record: &InfoRecord, _live: &Snapshot) -> Result<(), ProbeError> {
        let src = required_scalar(record, "src")?;
        let mount_point = required_scalar(record, "mount_point")?;
        let fstype = required_scalar(record, "fstype")?;
        let options = required_scalar(record, "options")?;
        self.runner
            .run_checked("mount", &["-t", fstype, "-o", options, src, mount_point])?;
        Ok(())
    }
}
