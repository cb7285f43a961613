use std::collections::HashMap;

use tracing::warn;

use doi2bib_core::Entry;

use crate::dedup::candidate::{CandidateKey, extract};

/// Why the members of a group were put together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupBasis {
    Key(CandidateKey),
    /// Connected through oracle-confirmed pairs.
    Semantic,
}

/// Two or more entry keys that probably describe the same publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    pub keys: Vec<String>,
    pub basis: GroupBasis,
}

impl DuplicateGroup {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Group entries by candidate key.
///
/// Groups come out in the order their key was first seen and members keep
/// input order. Unmatchable entries are logged and left out.
pub fn group(entries: &[Entry]) -> Vec<DuplicateGroup> {
    let mut index: HashMap<CandidateKey, usize> = HashMap::new();
    let mut buckets: Vec<(CandidateKey, Vec<String>)> = Vec::new();

    for entry in entries {
        let Some(key) = extract(entry) else {
            warn!(key = %entry.key, "cannot build a reliable dedupe key; skipping");
            continue;
        };
        match index.get(&key) {
            Some(&slot) => buckets[slot].1.push(entry.key.clone()),
            None => {
                index.insert(key.clone(), buckets.len());
                buckets.push((key, vec![entry.key.clone()]));
            }
        }
    }

    buckets
        .into_iter()
        .filter(|(_, keys)| keys.len() >= 2)
        .map(|(key, keys)| DuplicateGroup {
            keys,
            basis: GroupBasis::Key(key),
        })
        .collect()
}
