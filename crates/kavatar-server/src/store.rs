//! Save storage shared by every connection.

use dashmap::DashMap;
use kavatar_core::SaveStore;

/// String-keyed saves, shared across matches.
///
/// Writes only need a shared reference, so the store is used through
/// `&SharedSaves`.
#[derive(Debug, Default)]
pub struct SharedSaves {
    entries: DashMap<String, String>,
}

impl SharedSaves {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl SaveStore for &SharedSaves {
    fn put(&mut self, key: &str, value: String) {
        self.entries.insert(key.to_string(), value);
    }

    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|v| v.value().clone())
    }

    fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key).map(|(_, v)| v)
    }
}
