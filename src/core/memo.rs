use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::domain::QualifiedName;

/// Values produced during one calculation, keyed by qualified name.
///
/// Each value can carry a count of pending consumers. When release is on, a
/// value that is not pinned is dropped once its last consumer has read it.
#[derive(Debug, Default)]
pub struct MemoTable {
    values: HashMap<QualifiedName, Value>,
    pending: HashMap<QualifiedName, usize>,
    pinned: HashSet<QualifiedName>,
    release: bool,
}

impl MemoTable {
    pub fn new(release: bool) -> Self {
        Self {
            release,
            ..Self::default()
        }
    }

    /// Keep `name` until the end of the run regardless of consumers.
    pub fn pin(&mut self, name: QualifiedName) {
        self.pinned.insert(name);
    }

    pub fn expect_consumer(&mut self, name: &QualifiedName) {
        *self.pending.entry(name.clone()).or_insert(0) += 1;
    }

    pub fn insert(&mut self, name: QualifiedName, value: Value) {
        self.values.insert(name, value);
    }

    pub fn get(&self, name: &QualifiedName) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &QualifiedName) -> bool {
        self.values.contains_key(name)
    }

    /// Record that one consumer of `name` has read it.
    pub fn consume(&mut self, name: &QualifiedName) {
        let Some(count) = self.pending.get_mut(name) else {
            return;
        };
        *count = count.saturating_sub(1);
        if *count == 0 && self.release && !self.pinned.contains(name) {
            self.pending.remove(name);
            self.values.remove(name);
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_values(self) -> HashMap<QualifiedName, Value> {
        self.values
    }
}
