use std::fmt;

use doi2bib_core::Entry;

/// Grouping key derived from one entry. Never stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CandidateKey {
    ByIdentifier(String),
    ByStructure {
        page: String,
        volume: String,
        journal: String,
    },
}

impl fmt::Display for CandidateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ByIdentifier(doi) => write!(f, "doi {doi}"),
            Self::ByStructure {
                page,
                volume,
                journal,
            } => write!(f, "{journal} {volume}, p. {page}"),
        }
    }
}

/// Derive the candidate key for an entry.
///
/// A non-empty DOI always wins. Otherwise the first page, volume and journal
/// must all be present. `None` means the entry cannot take part in grouping.
pub fn extract(entry: &Entry) -> Option<CandidateKey> {
    if let Some(doi) = entry.non_empty("doi") {
        return Some(CandidateKey::ByIdentifier(doi.to_string()));
    }

    let page = entry
        .value("pages")
        .or_else(|| entry.value("page"))
        .map(first_page)
        .unwrap_or_default();
    let volume = entry.value("volume").unwrap_or_default();
    let journal = entry.value("journal").unwrap_or_default();

    if page.is_empty() || volume.is_empty() || journal.is_empty() {
        return None;
    }
    Some(CandidateKey::ByStructure {
        page: page.to_string(),
        volume: volume.to_string(),
        journal: journal.to_string(),
    })
}

/// `"100--110"` -> `"100"`.
fn first_page(pages: &str) -> &str {
    pages
        .split('-')
        .next()
        .unwrap_or_default()
        .trim()
        .trim_matches('-')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(key: &str) -> Entry {
        Entry::new("article", key)
    }

    #[test]
    fn identifier_takes_precedence_over_structure() {
        let entry = article("a")
            .with_field("DOI", " 10.1/x ")
            .with_field("journal", "Nature")
            .with_field("volume", "1")
            .with_field("pages", "1-10");
        assert_eq!(
            extract(&entry),
            Some(CandidateKey::ByIdentifier("10.1/x".to_string()))
        );
    }

    #[test]
    fn structure_ignores_page_suffix() {
        let a = article("a")
            .with_field("journal", "J. Chem.")
            .with_field("volume", "12")
            .with_field("pages", "100-110");
        let b = article("b")
            .with_field("Journal", "J. Chem.")
            .with_field("volume", "12")
            .with_field("pages", "100--199");
        let key = extract(&a).unwrap();
        assert_eq!(extract(&b).unwrap(), key);
        assert_eq!(
            key,
            CandidateKey::ByStructure {
                page: "100".to_string(),
                volume: "12".to_string(),
                journal: "J. Chem.".to_string(),
            }
        );
    }

    #[test]
    fn page_field_is_a_fallback_for_pages() {
        let entry = article("a")
            .with_field("journal", "Nature")
            .with_field("volume", "3")
            .with_field("page", " 7 ");
        assert!(matches!(extract(&entry), Some(CandidateKey::ByStructure { page, .. }) if page == "7"));
    }

    #[test]
    fn blank_doi_falls_through_to_structure() {
        let entry = article("a")
            .with_field("doi", "  ")
            .with_field("journal", "Nature")
            .with_field("volume", "3")
            .with_field("pages", "7");
        assert!(matches!(extract(&entry), Some(CandidateKey::ByStructure { .. })));
    }

    #[test]
    fn incomplete_entries_are_unmatchable() {
        assert_eq!(extract(&article("empty")), None);
        let no_volume = article("a")
            .with_field("journal", "Nature")
            .with_field("pages", "7");
        assert_eq!(extract(&no_volume), None);
        let dash_only = article("b")
            .with_field("journal", "Nature")
            .with_field("volume", "1")
            .with_field("pages", "--5");
        assert_eq!(extract(&dash_only), None);
    }
}
