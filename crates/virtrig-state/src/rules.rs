use crate::StateError;
use regex::Regex;
use std::collections::BTreeSet;

/// Per-kind allowlist separating benign churn from real leaks.
///
/// A permitted key suppresses both reporting and recovery for scalar drift
/// on that attribute. A permitted line pattern does the same for ordered
/// text: a text attribute change is ignored only when every added or
/// removed diff line matches at least one pattern (capacity counters inside
/// a pool XML, for example).
#[derive(Debug, Clone, Default)]
pub struct PermitRules {
    keys: BTreeSet<String>,
    patterns: Vec<Regex>,
}

impl PermitRules {
    pub fn new<K, P>(keys: K, patterns: P) -> Result<Self, StateError>
    where
        K: IntoIterator<Item = &'static str>,
        P: IntoIterator<Item = &'static str>,
    {
        let mut rules = Self {
            keys: keys.into_iter().map(str::to_owned).collect(),
            patterns: Vec::new(),
        };
        for pattern in patterns {
            rules.add_pattern(pattern)?;
        }
        Ok(rules)
    }

    pub fn add_key(&mut self, key: impl Into<String>) {
        self.keys.insert(key.into());
    }

    pub fn add_pattern(&mut self, pattern: &str) -> Result<(), StateError> {
        let regex = Regex::new(pattern).map_err(|source| StateError::InvalidPattern {
            pattern: pattern.to_owned(),
            source,
        })?;
        self.patterns.push(regex);
        Ok(())
    }

    pub fn permits_key(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// True when every changed diff line (`+`/`-` prefixed, headers already
    /// excluded) matches at least one permitted pattern. An empty change set
    /// is trivially permitted.
    pub fn permits_lines<'a>(&self, lines: impl IntoIterator<Item = &'a str>) -> bool {
        for line in lines {
            if !self.patterns.iter().any(|re| re.is_match(line)) {
                return false;
            }
        }
        true
    }
}
