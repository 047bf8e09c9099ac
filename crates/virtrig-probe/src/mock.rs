use crate::probe::{required_scalar, ResourceProbe};
use crate::ProbeError;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use virtrig_state::{InfoRecord, PermitRules, Snapshot};

/// In-memory probe for exercising the registry and recovery driver without
/// a hypervisor. Clones share state, so a test can keep a handle while the
/// registry owns the boxed probe, mutate the fake live resources between
/// backup and check, and assert on the remove/restore call log afterwards.
#[derive(Clone)]
pub struct MockProbe {
    kind: &'static str,
    rules: PermitRules,
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    live: BTreeMap<String, InfoRecord>,
    fail_list: Option<String>,
    fail_remove: Option<String>,
    fail_restore: Option<String>,
    calls: Vec<String>,
}

impl MockProbe {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            rules: PermitRules::default(),
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    pub fn with_rules(mut self, rules: PermitRules) -> Self {
        self.rules = rules;
        self
    }

    /// Make every `list_names` fail with the given message.
    pub fn fail_list(self, message: impl Into<String>) -> Self {
        self.lock().fail_list = Some(message.into());
        self
    }

    /// Make every `remove` fail with the given message.
    pub fn fail_remove(self, message: impl Into<String>) -> Self {
        self.lock().fail_remove = Some(message.into());
        self
    }

    /// Make every `restore` fail with the given message.
    pub fn fail_restore(self, message: impl Into<String>) -> Self {
        self.lock().fail_restore = Some(message.into());
        self
    }

    /// Add or replace a fake live resource with scalar attributes; the
    /// `name` attribute is filled in automatically.
    pub fn insert_resource(&self, name: &str, attrs: &[(&str, &str)]) {
        let mut record = InfoRecord::new();
        record.insert("name", name);
        for (key, value) in attrs {
            record.insert(*key, *value);
        }
        self.lock().live.insert(name.to_owned(), record);
    }

    pub fn delete_resource(&self, name: &str) {
        self.lock().live.remove(name);
    }

    pub fn set_attr(&self, name: &str, key: &str, value: &str) {
        if let Some(record) = self.lock().live.get_mut(name) {
            record.insert(key, value);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().live.contains_key(name)
    }

    pub fn live_record(&self, name: &str) -> Option<InfoRecord> {
        self.lock().live.get(name).cloned()
    }

    /// Chronological log of `remove <name>` / `restore <name>` invocations.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    #[allow(clippy::unwrap_used)]
    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        // Test support: a poisoned mutex means the test already failed.
        self.state.lock().unwrap()
    }
}

impl ResourceProbe for MockProbe {
    fn kind(&self) -> &'static str {
        self.kind
    }

    fn rules(&self) -> &PermitRules {
        &self.rules
    }

    fn rules_mut(&mut self) -> &mut PermitRules {
        &mut self.rules
    }

    fn list_names(&mut self) -> Result<Vec<String>, ProbeError> {
        let state = self.lock();
        if let Some(message) = &state.fail_list {
            return Err(ProbeError::CommandFailed {
                command: format!("mock list {}", self.kind),
                status: 1,
                stderr: message.clone(),
            });
        }
        Ok(state.live.keys().cloned().collect())
    }

    fn describe(&self, name: &str) -> Result<InfoRecord, ProbeError> {
        self.lock()
            .live
            .get(name)
            .cloned()
            .ok_or_else(|| ProbeError::Parse(format!("no such mock resource '{name}'")))
    }

    fn remove(&self, record: &InfoRecord) -> Result<(), ProbeError> {
        let name = required_scalar(record, "name")?.to_owned();
        let mut state = self.lock();
        state.calls.push(format!("remove {name}"));
        if let Some(message) = &state.fail_remove {
            return Err(ProbeError::CommandFailed {
                command: format!("mock remove {name}"),
                status: 1,
                stderr: message.clone(),
            });
        }
        state.live.remove(&name);
        Ok(())
    }

    fn restore(&self, record: &InfoRecord, _live: &Snapshot) -> Result<(), ProbeError> {
        let name = required_scalar(record, "name")?.to_owned();
        let mut state = self.lock();
        state.calls.push(format!("restore {name}"));
        if let Some(message) = &state.fail_restore {
            return Err(ProbeError::CommandFailed {
                command: format!("mock restore {name}"),
                status: 1,
                stderr: message.clone(),
            });
        }
        state.live.insert(name, record.clone());
        Ok(())
    }
}
