use crate::probe::{required_scalar, required_text, ResourceProbe};
use crate::ProbeError;
use std::path::PathBuf;
use tracing::debug;
use virtrig_state::{AttrValue, InfoRecord, PermitRules, Snapshot};

/// Tracked-file probe: watches the full content of a fixed set of host
/// config files and rewrites them from backup on drift.
///
/// Like directories, deleting an arbitrary host file is never safe, so
/// `remove` is permanently disallowed.
pub struct FileProbe {
    files: Vec<PathBuf>,
    rules: PermitRules,
}

impl FileProbe {
    pub fn new(files: Vec<PathBuf>) -> Self {
        Self {
            files,
            rules: PermitRules::default(),
        }
    }
}

impl ResourceProbe for FileProbe {
    fn kind(&self) -> &'static str {
        "file"
    }

    fn rules(&self) -> &PermitRules {
        &self.rules
    }

    fn rules_mut(&mut self) -> &mut PermitRules {
        &mut self.rules
    }

    fn list_names(&mut self) -> Result<Vec<String>, ProbeError> {
        Ok(self
            .files
            .iter()
            .map(|file| file.to_string_lossy().into_owned())
            .collect())
    }

    fn describe(&self, name: &str) -> Result<InfoRecord, ProbeError> {
        let bytes = std::fs::read(name)?;
        let content = String::from_utf8_lossy(&bytes);
        let mut record = InfoRecord::new();
        record.insert("path", name);
        // Split on '\n' (not lines()) so content round-trips exactly,
        // trailing newline included.
        record.insert(
            "content",
            AttrValue::text(content.split('\n').map(str::to_owned)),
        );
        Ok(record)
    }

    fn remove(&self, record: &InfoRecord) -> Result<(), ProbeError> {
        let name = record.scalar("path").unwrap_or("<unknown>").to_owned();
        Err(ProbeError::UnsafeRemove { kind: "file", name })
    }

    fn restore(&self, record: &InfoRecord, live: &Snapshot) -> Result<(), ProbeError> {
        let path = required_scalar(record, "path")?;
        let backup = required_text(record, "content")?;

        let unchanged = live
            .get(path)
            .and_then(|rec| rec.text("content"))
            .is_some_and(|current| current == backup);
        if !unchanged {
            debug!("rewriting drifted file {path}");
            std::fs::write(path, backup.join("\n"))?;
        }
        Ok(())
    }
}
