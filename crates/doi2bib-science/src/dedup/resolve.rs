use std::collections::{BTreeMap, HashSet};

use tracing::{info, warn};

use doi2bib_core::{Entry, Library};

use crate::dedup::grouping::DuplicateGroup;
use crate::dedup::mutate;

const MISSING: &str = "N/A";

/// What the authority sees for each live member of a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub key: String,
    pub journal: String,
    pub volume: String,
    pub pages: String,
}

impl Candidate {
    pub fn from_entry(entry: &Entry) -> Self {
        let show = |name: &str| entry.non_empty(name).unwrap_or(MISSING).to_string();
        Self {
            key: entry.key.clone(),
            journal: show("journal"),
            volume: show("volume"),
            pages: show("pages"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Keep the candidate at this index; discard the rest.
    Keep(usize),
    KeepAll,
    /// Stop the session; already resolved groups stay resolved.
    Abort,
}

/// Whoever decides which duplicate survives: a person at a terminal, or a
/// script in tests.
pub trait Authority {
    fn choose(&mut self, candidates: &[Candidate]) -> Decision;
}

impl<F> Authority for F
where
    F: FnMut(&[Candidate]) -> Decision,
{
    fn choose(&mut self, candidates: &[Candidate]) -> Decision {
        self(candidates)
    }
}

/// Discarded key -> kept key. Never maps a key to itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyMap(BTreeMap<String, String>);

impl KeyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` (and records nothing) for a self-mapping.
    pub fn insert(&mut self, old: impl Into<String>, new: impl Into<String>) -> bool {
        let (old, new) = (old.into(), new.into());
        if old == new {
            return false;
        }
        self.0.insert(old, new);
        true
    }

    pub fn get(&self, old: &str) -> Option<&str> {
        self.0.get(old).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for KeyMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupOutcome {
    Resolved,
    KeptAll,
    Skipped,
}

/// Result of one resolution session.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub key_map: KeyMap,
    /// Removed keys, in removal order.
    pub removed: Vec<String>,
    pub resolved: usize,
    pub kept_all: usize,
    pub skipped: usize,
    /// The authority aborted; later groups were not presented.
    pub interrupted: bool,
}

/// Walk the groups in order, ask the authority about each, and apply its
/// choice to the library.
///
/// Once a key has been decided (kept or removed) it is not offered again.
/// Each removal and its key-map entry are applied together, so an abort
/// leaves the library and key map consistent.
pub fn resolve(
    library: &mut Library,
    groups: &[DuplicateGroup],
    authority: &mut dyn Authority,
) -> Resolution {
    let mut processed: HashSet<String> = HashSet::new();
    let mut resolution = Resolution::default();

    for group in groups {
        let live = group
            .keys
            .iter()
            .filter(|key| !processed.contains(*key))
            .filter_map(|key| library.get(key))
            .map(Candidate::from_entry)
            .collect::<Vec<_>>();

        if live.len() < 2 {
            resolution.skipped += 1;
            continue;
        }

        match authority.choose(&live) {
            Decision::Abort => {
                info!("resolution interrupted");
                resolution.interrupted = true;
                break;
            }
            Decision::Keep(idx) if idx < live.len() => {
                let kept = live[idx].key.clone();
                info!(key = %kept, "keeping");
                for candidate in live.iter().filter(|c| c.key != kept) {
                    mutate::apply(library, [candidate.key.as_str()]);
                    resolution.key_map.insert(&candidate.key, &kept);
                    resolution.removed.push(candidate.key.clone());
                    processed.insert(candidate.key.clone());
                }
                processed.insert(kept);
                resolution.resolved += 1;
            }
            decision => {
                if let Decision::Keep(idx) = decision {
                    warn!(idx, candidates = live.len(), "choice out of range; keeping all");
                }
                processed.extend(live.into_iter().map(|c| c.key));
                resolution.kept_all += 1;
            }
        }
    }

    resolution
}
