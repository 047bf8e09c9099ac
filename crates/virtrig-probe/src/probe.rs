use crate::ProbeError;
use virtrig_state::{InfoRecord, PermitRules, Snapshot};

/// Capability set implemented once per resource kind.
///
/// `list_names` and `describe` are read-only toward the host; `remove` and
/// `restore` mutate it and are only ever invoked by the recovery driver,
/// which treats their failures as non-fatal findings.
pub trait ResourceProbe {
    /// Kind name used as the prefix of every finding ("domain", "mount", ...).
    fn kind(&self) -> &'static str;

    /// Allowlist applied when diffing this kind's snapshots.
    fn rules(&self) -> &PermitRules;

    /// Mutable access to the allowlist, for configuration-supplied extras.
    fn rules_mut(&mut self) -> &mut PermitRules;

    /// Enumerate all currently existing instances, active and inactive.
    /// Idempotent and side-effect free toward the host; probes may cache
    /// parse results in instance fields for the following `describe` calls.
    fn list_names(&mut self) -> Result<Vec<String>, ProbeError>;

    /// Capture a normalized record with enough information to fully
    /// reconstruct the instance. Must never mutate host state.
    fn describe(&self, name: &str) -> Result<InfoRecord, ProbeError>;

    /// Delete the live instance represented by `record`, including the
    /// persistent definition where one exists.
    fn remove(&self, record: &InfoRecord) -> Result<(), ProbeError>;

    /// (Re)create the instance to exactly match `record`. `live` is the
    /// freshly derived snapshot: if an instance of the same name currently
    /// exists, it is removed before recreation.
    fn restore(&self, record: &InfoRecord, live: &Snapshot) -> Result<(), ProbeError>;

    /// Enumerate and describe everything: the unit of `backup` and `check`.
    fn snapshot(&mut self) -> Result<Snapshot, ProbeError> {
        let mut snap = Snapshot::new();
        for name in self.list_names()? {
            let record = self.describe(&name)?;
            snap.insert(name, record);
        }
        Ok(snap)
    }
}

/// Scalar attribute that must be present on a record handed to
/// `remove`/`restore`; its absence is a logic error surfaced as `Parse`.
pub(crate) fn required_scalar<'a>(
    record: &'a InfoRecord,
    key: &str,
) -> Result<&'a str, ProbeError> {
    record
        .scalar(key)
        .ok_or_else(|| ProbeError::Parse(format!("record is missing scalar attribute '{key}'")))
}

/// Text attribute counterpart of `required_scalar`.
pub(crate) fn required_text<'a>(
    record: &'a InfoRecord,
    key: &str,
) -> Result<&'a [String], ProbeError> {
    record
        .text(key)
        .ok_or_else(|| ProbeError::Parse(format!("record is missing text attribute '{key}'")))
}
