use crate::error::{CoreError, Result};
use crate::models::entry::Entry;

/// A `@string`, `@preamble` or `@comment` block, kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock {
    pub kind: String,
    pub text: String,
}

/// A block the parser could not understand. Reported, never processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedBlock {
    /// Citation key if one could be read before the failure.
    pub key_hint: Option<String>,
    pub raw: String,
    pub error: String,
}

impl FailedBlock {
    pub fn label(&self) -> &str {
        self.key_hint.as_deref().unwrap_or("<unknown>")
    }
}

/// An ordered collection of entries with unique keys.
#[derive(Debug, Clone, Default)]
pub struct Library {
    entries: Vec<Entry>,
    pub blocks: Vec<RawBlock>,
    pub failed_blocks: Vec<FailedBlock>,
}

impl Library {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.key.as_str())
    }

    pub fn get(&self, key: &str) -> Option<&Entry> {
        self.entries.iter().find(|entry| entry.key == key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Add an entry, failing if its key is already taken. Keys are compared
    /// case-insensitively, as in `add_disambiguated`.
    pub fn add(&mut self, entry: Entry) -> Result<()> {
        if self.key_taken(&entry.key) {
            return Err(CoreError::DuplicateKey(entry.key));
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Add an entry, appending `_1`, `_2`, ... to its key until it is unique.
    /// Collisions are checked case-insensitively. Returns the final key.
    pub fn add_disambiguated(&mut self, mut entry: Entry) -> String {
        let base = entry.key.clone();
        let mut n = 1;
        while self.key_taken(&entry.key) {
            entry.key = format!("{base}_{n}");
            n += 1;
        }
        let key = entry.key.clone();
        self.entries.push(entry);
        key
    }

    fn key_taken(&self, key: &str) -> bool {
        self.entries
            .iter()
            .any(|existing| existing.key.eq_ignore_ascii_case(key))
    }

    /// Remove an entry by key. Absent keys are a no-op.
    pub fn remove(&mut self, key: &str) -> Option<Entry> {
        let idx = self.entries.iter().position(|entry| entry.key == key)?;
        Some(self.entries.remove(idx))
    }

    /// Replace the entry with the same key, keeping its position.
    pub fn replace(&mut self, entry: Entry) -> Result<Entry> {
        let slot = self
            .entries
            .iter_mut()
            .find(|existing| existing.key == entry.key)
            .ok_or_else(|| CoreError::EntryNotFound(entry.key.clone()))?;
        Ok(std::mem::replace(slot, entry))
    }

    /// Keep only entries for which `keep` returns true.
    pub fn retain(&mut self, keep: impl FnMut(&Entry) -> bool) {
        self.entries.retain(keep);
    }
}
