use crate::host::HostRunner;
use crate::mount::parse_mount_table;
use crate::probe::{required_scalar, ResourceProbe};
use crate::ProbeError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;
use virtrig_state::{AttrValue, InfoRecord, PermitRules, Snapshot};

/// Tracked-directory probe: watches the entry listings of a fixed set of
/// host directories (scratch dirs, image dirs).
///
/// Deleting an arbitrary host directory is never safe, so `remove` is
/// permanently disallowed; recovery reconciles entries instead.
pub struct DirProbe {
    dirs: Vec<PathBuf>,
    runner: HostRunner,
    mounts_file: PathBuf,
    rules: PermitRules,
}

impl DirProbe {
    /// `mounts_file` is the same mount table the mount probe reads, so both
    /// probes agree on what is currently mounted.
    pub fn new(
        dirs: Vec<PathBuf>,
        mounts_file: impl Into<PathBuf>,
        runner: HostRunner,
    ) -> Result<Self, ProbeError> {
        Ok(Self {
            dirs,
            runner,
            mounts_file: mounts_file.into(),
            rules: PermitRules::new(["aexpect"], [])?,
        })
    }

    fn is_mount_point(&self, path: &Path) -> bool {
        let Ok(content) = std::fs::read_to_string(&self.mounts_file) else {
            return false;
        };
        let path = path.to_string_lossy();
        parse_mount_table(&content)
            .iter()
            .any(|entry| entry.mount_point == path)
    }

    fn delete_entry(&self, path: &Path) -> Result<(), ProbeError> {
        debug!("removing leaked entry {}", path.display());
        if path.is_dir() {
            if self.is_mount_point(path) {
                // A leaked mount under a tracked dir: lazy-unmount before
                // the tree can be deleted.
                let target = path.to_string_lossy();
                self.runner.run_checked("umount", &["-l", &target])?;
            } else {
                std::fs::remove_dir_all(path)?;
            }
        } else {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

fn entries_of<'a>(
    record: &'a InfoRecord,
    key: &str,
) -> Result<&'a BTreeMap<String, String>, ProbeError> {
    match record.get(key) {
        Some(AttrValue::Entries(map)) => Ok(map),
        _ => Err(ProbeError::Parse(format!(
            "record is missing entry map '{key}'"
        ))),
    }
}

impl ResourceProbe for DirProbe {
    fn kind(&self) -> &'static str {
        "directory"
    }

    fn rules(&self) -> &PermitRules {
        &self.rules
    }

    fn rules_mut(&mut self) -> &mut PermitRules {
        &mut self.rules
    }

    fn list_names(&mut self) -> Result<Vec<String>, ProbeError> {
        Ok(self
            .dirs
            .iter()
            .map(|dir| dir.to_string_lossy().into_owned())
            .collect())
    }

    fn describe(&self, name: &str) -> Result<InfoRecord, ProbeError> {
        let mut entries = BTreeMap::new();
        for entry in std::fs::read_dir(name)? {
            let entry = entry?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            entries.insert(file_name.clone(), file_name);
        }
        let mut record = InfoRecord::new();
        record.insert("path", name);
        record.insert("entries", AttrValue::Entries(entries));
        Ok(record)
    }

    fn remove(&self, record: &InfoRecord) -> Result<(), ProbeError> {
        let name = record.scalar("path").unwrap_or("<unknown>").to_owned();
        Err(ProbeError::UnsafeRemove {
            kind: "directory",
            name,
        })
    }

    fn restore(&self, record: &InfoRecord, live: &Snapshot) -> Result<(), ProbeError> {
        let dirname = required_scalar(record, "path")?;
        let backup = entries_of(record, "entries")?;

        let fresh;
        let current = match live.get(dirname) {
            Some(rec) => entries_of(rec, "entries")?,
            None => {
                fresh = self.describe(dirname)?;
                entries_of(&fresh, "entries")?
            }
        };

        for entry in current.keys() {
            if !backup.contains_key(entry) {
                self.delete_entry(&Path::new(dirname).join(entry))?;
            }
        }
        for entry in backup.keys() {
            if !current.contains_key(entry) {
                // TODO: capture entry kinds and contents at backup time so
                // deleted files come back with their original bytes.
                let path = Path::new(dirname).join(entry);
                std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::runner;

    fn probe_for(dir: &Path) -> DirProbe {
        DirProbe::new(vec![dir.to_path_buf()], "/nonexistent/mounts", runner()).unwrap()
    }

    #[test]
    fn describe_lists_entries() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.img"), "").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let probe = probe_for(dir.path());
        let record = probe.describe(&dir.path().to_string_lossy()).unwrap();
        let entries = entries_of(&record, "entries").unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.contains_key("a.img"));
        assert!(entries.contains_key("sub"));
    }

    #[test]
    fn remove_is_unsafe_by_design() {
        let dir = tempfile::tempdir().unwrap();
        let probe = probe_for(dir.path());
        let mut record = InfoRecord::new();
        record.insert("path", "/tmp");
        let err = probe.remove(&record).unwrap_err();
        assert!(err.is_permanent());
        assert!(err.to_string().contains("unsafe to remove"));
    }

    #[test]
    fn restore_deletes_created_entries_and_touches_deleted_ones() {
        let dir = tempfile::tempdir().unwrap();
        let name = dir.path().to_string_lossy().into_owned();
        std::fs::write(dir.path().join("kept"), "x").unwrap();
        std::fs::write(dir.path().join("vanished"), "y").unwrap();

        let mut probe = probe_for(dir.path());
        let backup = probe.snapshot().unwrap();

        // A test leaks a file and a directory, and deletes one file.
        std::fs::write(dir.path().join("leaked"), "z").unwrap();
        std::fs::create_dir(dir.path().join("leaked_dir")).unwrap();
        std::fs::remove_file(dir.path().join("vanished")).unwrap();

        let live = probe.snapshot().unwrap();
        probe.restore(backup.get(&name).unwrap(), &live).unwrap();

        assert!(dir.path().join("kept").exists());
        assert!(!dir.path().join("leaked").exists());
        assert!(!dir.path().join("leaked_dir").exists());
        // Recreated as an empty placeholder.
        assert!(dir.path().join("vanished").exists());
        assert_eq!(
            std::fs::read(dir.path().join("vanished")).unwrap().len(),
            0
        );
    }

    #[test]
    fn mount_point_lookup_uses_configured_table() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("nfs");
        std::fs::create_dir(&sub).unwrap();

        let table = dir.path().join("mtab");
        std::fs::write(
            &table,
            format!("host:/export {} nfs rw 0 0\n", sub.display()),
        )
        .unwrap();

        let probe = DirProbe::new(vec![dir.path().to_path_buf()], &table, runner()).unwrap();
        assert!(probe.is_mount_point(&sub));
        assert!(!probe.is_mount_point(dir.path()));
    }

    #[test]
    fn describe_missing_directory_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let probe = probe_for(dir.path());
        assert!(matches!(
            probe.describe("/nonexistent/dir"),
            Err(ProbeError::Io(_))
        ));
    }
}
