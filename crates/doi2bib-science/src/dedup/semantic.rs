use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use tracing::{debug, info};

use doi2bib_core::{DedupeConfig, Entry};

use crate::dedup::grouping::{DuplicateGroup, GroupBasis};

/// An external judge of whether two entries describe the same publication.
#[async_trait]
pub trait SimilarityOracle: Send + Sync {
    /// Whether the oracle can be reached at all. Checked once before a pass.
    async fn is_available(&self) -> bool;

    /// `true` only on a positive, well-formed answer.
    async fn verdict(&self, a: &Entry, b: &Entry) -> bool;
}

/// Pre-filter and consolidation around a [`SimilarityOracle`].
#[derive(Debug, Clone)]
pub struct SemanticMatcher {
    title_similarity_threshold: f64,
    journal_prefix_len: usize,
}

impl Default for SemanticMatcher {
    fn default() -> Self {
        Self::from_config(&DedupeConfig::default())
    }
}

impl SemanticMatcher {
    pub fn from_config(config: &DedupeConfig) -> Self {
        Self {
            title_similarity_threshold: config.title_similarity_threshold.clamp(0.0, 1.0),
            journal_prefix_len: config.journal_prefix_len,
        }
    }

    pub fn with_title_threshold(mut self, threshold: f64) -> Self {
        self.title_similarity_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Index pairs worth asking the oracle about: same `(year, journal prefix)`
    /// bucket and title similarity strictly above the threshold.
    pub fn candidate_pairs(&self, entries: &[Entry]) -> Vec<(usize, usize)> {
        let mut bucket_index: HashMap<(String, String), usize> = HashMap::new();
        let mut buckets: Vec<Vec<usize>> = Vec::new();
        for (idx, entry) in entries.iter().enumerate() {
            let bucket = self.bucket(entry);
            let slot = *bucket_index.entry(bucket).or_insert_with(|| {
                buckets.push(Vec::new());
                buckets.len() - 1
            });
            buckets[slot].push(idx);
        }

        let titles = entries.iter().map(normalized_title).collect::<Vec<_>>();
        let mut evaluated = HashSet::new();
        let mut pairs = Vec::new();
        for members in &buckets {
            for (n, &i) in members.iter().enumerate() {
                for &j in &members[n + 1..] {
                    if !evaluated.insert((i, j)) {
                        continue;
                    }
                    let (a, b) = (&titles[i], &titles[j]);
                    if a.is_empty() || b.is_empty() {
                        continue;
                    }
                    if strsim::normalized_levenshtein(a, b) > self.title_similarity_threshold {
                        pairs.push((i, j));
                    }
                }
            }
        }
        pairs
    }

    /// Ask the oracle about every candidate pair and merge confirmed pairs
    /// into connected components. A→B and B→C yields {A, B, C}.
    pub async fn find_semantic_duplicates(
        &self,
        entries: &[Entry],
        oracle: &dyn SimilarityOracle,
    ) -> Vec<DuplicateGroup> {
        let pairs = self.candidate_pairs(entries);
        info!(pairs = pairs.len(), "asking oracle about candidate pairs");

        let mut confirmed = Vec::new();
        for (i, j) in pairs {
            let same = oracle.verdict(&entries[i], &entries[j]).await;
            debug!(a = %entries[i].key, b = %entries[j].key, same, "oracle verdict");
            if same {
                confirmed.push((i, j));
            }
        }

        connected_components(entries.len(), &confirmed)
            .into_iter()
            .map(|component| DuplicateGroup {
                keys: component
                    .into_iter()
                    .map(|idx| entries[idx].key.clone())
                    .collect(),
                basis: GroupBasis::Semantic,
            })
            .collect()
    }

    fn bucket(&self, entry: &Entry) -> (String, String) {
        let year = entry.value("year").unwrap_or_default().trim().to_string();
        let journal = entry
            .value("journal")
            .unwrap_or_default()
            .trim()
            .to_lowercase()
            .chars()
            .take(self.journal_prefix_len)
            .collect();
        (year, journal)
    }
}

fn normalized_title(entry: &Entry) -> String {
    entry
        .value("title")
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}

/// Components of size ≥2 via breadth-first traversal. Components are ordered
/// by their lowest index and members are sorted.
pub fn connected_components(size: usize, edges: &[(usize, usize)]) -> Vec<Vec<usize>> {
    let mut adjacency = vec![Vec::new(); size];
    for &(a, b) in edges {
        adjacency[a].push(b);
        adjacency[b].push(a);
    }

    let mut visited = vec![false; size];
    let mut components = Vec::new();
    for start in 0..size {
        if visited[start] || adjacency[start].is_empty() {
            continue;
        }
        visited[start] = true;
        let mut queue = VecDeque::from([start]);
        let mut component = Vec::new();
        while let Some(node) = queue.pop_front() {
            component.push(node);
            for &next in &adjacency[node] {
                if !visited[next] {
                    visited[next] = true;
                    queue.push_back(next);
                }
            }
        }
        component.sort_unstable();
        components.push(component);
    }
    components
}
