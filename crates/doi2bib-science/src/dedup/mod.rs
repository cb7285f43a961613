//! Duplicate detection and resolution for BibTeX libraries.

pub mod candidate;
pub mod grouping;
pub mod llm_oracle;
pub mod mutate;
pub mod resolve;
pub mod semantic;

pub use candidate::{CandidateKey, extract};
pub use grouping::{DuplicateGroup, GroupBasis, group};
pub use llm_oracle::LlmOracle;
pub use mutate::apply;
pub use resolve::{Authority, Candidate, Decision, KeyMap, Resolution, resolve};
pub use semantic::{SemanticMatcher, SimilarityOracle, connected_components};

use tracing::{info, warn};

use doi2bib_core::{DedupeConfig, Library};

pub const ORACLE_FALLBACK_WARNING: &str =
    "similarity oracle unavailable; using identifier and page/volume/journal matching only";

/// Groups to put in front of the resolution authority, in order.
#[derive(Debug, Clone, Default)]
pub struct DedupePlan {
    pub groups: Vec<DuplicateGroup>,
    pub warnings: Vec<String>,
    pub used_oracle: bool,
}

impl DedupePlan {
    /// Structural groups always come first. When an oracle is given and
    /// reachable its groups are appended; otherwise a fallback warning is
    /// recorded and the structural groups stand alone.
    pub async fn build(
        library: &Library,
        oracle: Option<&dyn SimilarityOracle>,
        config: &DedupeConfig,
    ) -> Self {
        let mut plan = Self {
            groups: group(library.entries()),
            ..Self::default()
        };
        info!(groups = plan.groups.len(), "structural duplicate groups");

        let Some(oracle) = oracle else {
            return plan;
        };

        if !oracle.is_available().await {
            warn!("{ORACLE_FALLBACK_WARNING}");
            plan.warnings.push(ORACLE_FALLBACK_WARNING.to_string());
            return plan;
        }

        let semantic = SemanticMatcher::from_config(config)
            .find_semantic_duplicates(library.entries(), oracle)
            .await;
        info!(groups = semantic.len(), "oracle duplicate groups");
        plan.groups.extend(semantic);
        plan.used_oracle = true;
        plan
    }
}

#[derive(Debug, Clone, Default)]
pub struct DedupeOutcome {
    pub resolution: Resolution,
    pub warnings: Vec<String>,
    /// Labels of blocks that failed to parse; their entries were never
    /// considered.
    pub failed_blocks: Vec<String>,
}

impl DedupeOutcome {
    pub fn key_map(&self) -> &KeyMap {
        &self.resolution.key_map
    }
}

/// Run the resolution session for a plan against the library it was built from.
pub fn dedupe_library(
    library: &mut Library,
    plan: &DedupePlan,
    authority: &mut dyn Authority,
) -> DedupeOutcome {
    let failed_blocks = library
        .failed_blocks
        .iter()
        .map(|failed| failed.label().to_string())
        .collect::<Vec<_>>();
    for label in &failed_blocks {
        warn!(block = %label, "unparsed block left out of deduplication");
    }

    let resolution = resolve(library, &plan.groups, authority);
    info!(
        resolved = resolution.resolved,
        removed = resolution.removed.len(),
        skipped = resolution.skipped,
        interrupted = resolution.interrupted,
        "deduplication finished"
    );

    DedupeOutcome {
        resolution,
        warnings: plan.warnings.clone(),
        failed_blocks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use doi2bib_core::Entry;
    use doi2bib_core::bibtex::parse_str;

    struct Offline;

    #[async_trait]
    impl SimilarityOracle for Offline {
        async fn is_available(&self) -> bool {
            false
        }

        async fn verdict(&self, _: &Entry, _: &Entry) -> bool {
            panic!("an unavailable oracle must not be consulted")
        }
    }

    struct AlwaysSame;

    #[async_trait]
    impl SimilarityOracle for AlwaysSame {
        async fn is_available(&self) -> bool {
            true
        }

        async fn verdict(&self, _: &Entry, _: &Entry) -> bool {
            true
        }
    }

    const BIB: &str = r#"
@article{smith20, doi = {10.1/x}, journal = {Nature}, volume = {1}, pages = {1-10}, year = {2020}, title = {Deep learning for proteins}}
@article{smith20b, doi = {10.1/x}, journal = {Nature}, volume = {1}, pages = {1-12}, year = {2020}, title = {Deep learning for proteins}}
@article{lee20, journal = {Nature Physics}, year = {2020}, title = {Deep learning for protein}}
@article{broken, title = {unterminated
"#;

    #[tokio::test]
    async fn plan_without_oracle_is_structural() {
        let library = parse_str(BIB);
        let plan = DedupePlan::build(&library, None, &DedupeConfig::default()).await;
        assert_eq!(plan.groups.len(), 1);
        assert!(!plan.used_oracle);
        assert!(plan.warnings.is_empty());
    }

    #[tokio::test]
    async fn unavailable_oracle_falls_back_with_warning() {
        let library = parse_str(BIB);
        let plan = DedupePlan::build(&library, Some(&Offline), &DedupeConfig::default()).await;
        assert_eq!(plan.groups.len(), 1);
        assert_eq!(plan.warnings, vec![ORACLE_FALLBACK_WARNING.to_string()]);
    }

    #[tokio::test]
    async fn oracle_groups_follow_structural_groups() {
        let library = parse_str(BIB);
        let plan = DedupePlan::build(&library, Some(&AlwaysSame), &DedupeConfig::default()).await;
        assert!(plan.used_oracle);
        assert_eq!(plan.groups.len(), 2);
        assert!(matches!(plan.groups[0].basis, GroupBasis::Key(_)));
        assert_eq!(plan.groups[1].basis, GroupBasis::Semantic);
        assert_eq!(plan.groups[1].keys, vec!["smith20", "smith20b", "lee20"]);
    }

    #[tokio::test]
    async fn overlapping_oracle_group_only_offers_undecided_members() {
        let mut library = parse_str(BIB);
        let plan = DedupePlan::build(&library, Some(&AlwaysSame), &DedupeConfig::default()).await;

        let mut offered = Vec::new();
        let mut authority = |candidates: &[Candidate]| {
            offered.push(candidates.len());
            Decision::Keep(0)
        };
        let outcome = dedupe_library(&mut library, &plan, &mut authority);

        // smith20 and smith20b are decided by the first group, leaving only
        // lee20 live in the second.
        assert_eq!(offered, vec![2]);
        assert_eq!(outcome.resolution.skipped, 1);
        assert_eq!(outcome.key_map().get("smith20b"), Some("smith20"));
        assert_eq!(outcome.failed_blocks.len(), 1);
        assert_eq!(library.keys().collect::<Vec<_>>(), vec!["smith20", "lee20"]);
    }

    #[tokio::test]
    async fn string_macro_journal_groups_with_spelled_out_journal() {
        let library = parse_str(
            "@string{nat = \"Nature\"}\n\
             @article{a, journal = nat, volume = {1}, pages = {5-9}}\n\
             @article{b, journal = {Nature}, volume = {1}, pages = {5-7}}\n",
        );
        let plan = DedupePlan::build(&library, None, &DedupeConfig::default()).await;
        assert_eq!(plan.groups.len(), 1);
        assert_eq!(plan.groups[0].keys, vec!["a", "b"]);
    }
}
