use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single captured attribute value.
///
/// Resource info is not a fixed schema: two instances of the same kind may
/// expose different attribute sets, and each attribute is either a plain
/// scalar (a `dominfo` field), ordered line-oriented text (an inactive XML
/// export), or a named entry map (a directory listing).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Scalar(String),
    Text(Vec<String>),
    Entries(BTreeMap<String, String>),
}

impl AttrValue {
    pub fn scalar(value: impl Into<String>) -> Self {
        Self::Scalar(value.into())
    }

    pub fn text(lines: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::Text(lines.into_iter().map(Into::into).collect())
    }

    /// Short shape name used in "invalid type" findings.
    pub fn shape(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "scalar",
            Self::Text(_) => "text",
            Self::Entries(_) => "entries",
        }
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        Self::Scalar(value)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::Scalar(value.to_owned())
    }
}

/// Normalized descriptive snapshot of one resource instance: attribute name
/// to value. Ordered so diff output is deterministic within a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoRecord(pub BTreeMap<String, AttrValue>);

impl InfoRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<AttrValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.0.get(key)
    }

    /// Scalar attribute lookup; `None` when absent or not a scalar.
    pub fn scalar(&self, key: &str) -> Option<&str> {
        match self.0.get(key) {
            Some(AttrValue::Scalar(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Text attribute lookup; `None` when absent or not ordered text.
    pub fn text(&self, key: &str) -> Option<&[String]> {
        match self.0.get(key) {
            Some(AttrValue::Text(lines)) => Some(lines.as_slice()),
            _ => None,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttrValue)> {
        self.0.iter()
    }
}

impl FromIterator<(String, AttrValue)> for InfoRecord {
    fn from_iter<T: IntoIterator<Item = (String, AttrValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The state of one resource kind at one instant: resource name to record.
///
/// Snapshots are immutable once taken; a post-test check re-derives a fresh
/// snapshot and diffs it against the stored one, never the other way around.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot(pub BTreeMap<String, InfoRecord>);

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, record: InfoRecord) {
        self.0.insert(name.into(), record);
    }

    pub fn get(&self, name: &str) -> Option<&InfoRecord> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, InfoRecord)> for Snapshot {
    fn from_iter<T: IntoIterator<Item = (String, InfoRecord)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_accessor_rejects_other_shapes() {
        let mut rec = InfoRecord::new();
        rec.insert("state", "running");
        rec.insert("inactive xml", AttrValue::text(["<domain>", "</domain>"]));

        assert_eq!(rec.scalar("state"), Some("running"));
        assert_eq!(rec.scalar("inactive xml"), None);
        assert_eq!(rec.text("inactive xml").map(<[String]>::len), Some(2));
        assert_eq!(rec.text("state"), None);
    }

    #[test]
    fn snapshot_names_are_sorted() {
        let mut snap = Snapshot::new();
        snap.insert("vm2", InfoRecord::new());
        snap.insert("vm1", InfoRecord::new());
        let names: Vec<_> = snap.names().cloned().collect();
        assert_eq!(names, vec!["vm1", "vm2"]);
    }

    #[test]
    fn attr_value_shape_names() {
        assert_eq!(AttrValue::scalar("x").shape(), "scalar");
        assert_eq!(AttrValue::text(["x"]).shape(), "text");
        assert_eq!(AttrValue::Entries(BTreeMap::new()).shape(), "entries");
    }
}
