//! Citation checking for LaTeX documents.

pub mod cites;
pub mod rewrite;

pub use cites::{find_citation_keys, find_citation_keys_in_files};
pub use rewrite::{RewriteReport, replace_token, rewrite_documents, rewrite_text};

use std::collections::HashSet;
use std::path::Path;

use tracing::{info, warn};

use doi2bib_core::{DedupeConfig, Library};

use crate::dedup::{Authority, DedupeOutcome, DedupePlan, KeyMap, SimilarityOracle, dedupe_library};
use crate::error::Result;

#[derive(Debug, Clone, Default)]
pub struct TexCheckOutcome {
    pub cited_keys: Vec<String>,
    /// Cited keys with no entry in the library.
    pub unknown_keys: Vec<String>,
    pub dedupe: DedupeOutcome,
    /// `None` when there was nothing to rewrite.
    pub rewrite: Option<RewriteReport>,
    /// Replaced keys the documents still cite after the rewrite, e.g. in
    /// `\cite{a, b}` where a space separates the keys.
    pub stale_keys: Vec<String>,
}

/// Find duplicate entries among those the documents cite, let the authority
/// pick the survivors, then point the documents' citations at them. The
/// library itself is left untouched.
pub async fn check_tex_cites(
    tex_paths: &[impl AsRef<Path>],
    library: &Library,
    oracle: Option<&dyn SimilarityOracle>,
    config: &DedupeConfig,
    authority: &mut dyn Authority,
) -> Result<TexCheckOutcome> {
    let cited_keys = find_citation_keys_in_files(tex_paths)?;
    info!(keys = cited_keys.len(), "citation keys found");

    let cited = cited_keys.iter().map(String::as_str).collect::<HashSet<_>>();
    let mut restricted = library.clone();
    restricted.retain(|entry| cited.contains(entry.key.as_str()));
    let unknown_keys = cited_keys
        .iter()
        .filter(|key| !restricted.contains(key))
        .cloned()
        .collect();

    let plan = DedupePlan::build(&restricted, oracle, config).await;
    let dedupe = dedupe_library(&mut restricted, &plan, authority);

    let (rewrite, stale_keys) = if dedupe.key_map().is_empty() {
        info!("no citations to rewrite");
        (None, Vec::new())
    } else {
        let report = rewrite_documents(tex_paths, dedupe.key_map());
        (Some(report), stale_citations(tex_paths, dedupe.key_map()))
    };

    Ok(TexCheckOutcome {
        cited_keys,
        unknown_keys,
        dedupe,
        rewrite,
        stale_keys,
    })
}

/// Keys from the map that the documents still cite.
fn stale_citations(tex_paths: &[impl AsRef<Path>], key_map: &KeyMap) -> Vec<String> {
    let cited = match find_citation_keys_in_files(tex_paths) {
        Ok(keys) => keys,
        Err(e) => {
            warn!(error = %e, "could not re-read documents after rewrite");
            return Vec::new();
        }
    };
    cited
        .into_iter()
        .filter(|key| key_map.get(key).is_some())
        .inspect(|key| warn!(key = %key, "citation still uses a replaced key"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::{Candidate, Decision};
    use doi2bib_core::bibtex::parse_str;
    use tempfile::TempDir;

    const BIB: &str = r#"
@article{smith20, doi = {10.1/x}, journal = {Nature}}
@article{smith20b, doi = {10.1/x}, journal = {Nature}}
@article{smith20c, doi = {10.1/x}, journal = {Nature}}
@article{jones19, doi = {10.2/y}}
"#;

    #[tokio::test]
    async fn rewrites_citations_to_the_kept_entry() {
        let dir = TempDir::new().unwrap();
        let tex = dir.path().join("paper.tex");
        std::fs::write(&tex, r"\cite{smith20b,jones19} and \citep{smith20}").unwrap();

        let library = parse_str(BIB);
        let mut offered = Vec::new();
        let mut authority = |candidates: &[Candidate]| {
            offered.extend(candidates.iter().map(|c| c.key.clone()));
            Decision::Keep(0)
        };
        let outcome = check_tex_cites(
            &[&tex],
            &library,
            None,
            &DedupeConfig::default(),
            &mut authority,
        )
        .await
        .unwrap();

        // smith20c is not cited, so it is never offered.
        assert_eq!(offered, vec!["smith20", "smith20b"]);
        assert_eq!(outcome.dedupe.key_map().get("smith20b"), Some("smith20"));
        assert_eq!(
            std::fs::read_to_string(&tex).unwrap(),
            r"\cite{smith20,jones19} and \citep{smith20}"
        );
        assert!(dir.path().join("paper.tex.bak").exists());
        assert!(outcome.stale_keys.is_empty());
        assert_eq!(library.len(), 4);
    }

    #[tokio::test]
    async fn keys_after_a_spaced_comma_are_reported_as_stale() {
        let dir = TempDir::new().unwrap();
        let tex = dir.path().join("paper.tex");
        std::fs::write(&tex, r"\cite{jones19, smith20b} and \citep{smith20}").unwrap();

        let outcome = check_tex_cites(
            &[&tex],
            &parse_str(BIB),
            None,
            &DedupeConfig::default(),
            &mut |_: &[Candidate]| Decision::Keep(0),
        )
        .await
        .unwrap();

        assert_eq!(outcome.dedupe.key_map().get("smith20b"), Some("smith20"));
        assert_eq!(outcome.stale_keys, vec!["smith20b"]);
        assert_eq!(
            std::fs::read_to_string(&tex).unwrap(),
            r"\cite{jones19, smith20b} and \citep{smith20}"
        );
    }

    #[tokio::test]
    async fn nothing_to_resolve_leaves_documents_alone() {
        let dir = TempDir::new().unwrap();
        let tex = dir.path().join("paper.tex");
        std::fs::write(&tex, r"\cite{jones19,ghost}").unwrap();

        let outcome = check_tex_cites(
            &[&tex],
            &parse_str(BIB),
            None,
            &DedupeConfig::default(),
            &mut |_: &[Candidate]| Decision::Abort,
        )
        .await
        .unwrap();

        assert!(outcome.rewrite.is_none());
        assert!(outcome.stale_keys.is_empty());
        assert_eq!(outcome.unknown_keys, vec!["ghost"]);
        assert!(!dir.path().join("paper.tex.bak").exists());
    }
}
