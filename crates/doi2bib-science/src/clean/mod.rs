//! Entry cleaning for `bibtexdb --clean`: title case, unwanted fields, author
//! lists, page ranges and journal abbreviations.

pub mod journals;
pub mod text;

pub use journals::JournalAbbreviations;
pub use text::{normalize_authors, standardize_pages, title_case};

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info, warn};

use doi2bib_core::{CleanConfig, Entry, Library};

/// Fields an article needs before it can be cleaned.
pub const REQUIRED_FIELDS: &[&str] = &["title", "journal"];

/// Answer to "replace this journal name with that abbreviation?".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbbreviationChoice {
    Accept,
    /// Keep the name as written and do not ask about it again this run.
    Decline,
    /// Use this abbreviation instead. It is reported back as a custom one.
    Replace(String),
    Abort,
}

pub trait AbbreviationAuthority {
    /// `score` is the similarity of the suggestion, `0.0` when the list had
    /// nothing to offer and the suggestion is the name itself.
    fn choose(&mut self, journal: &str, suggestion: &str, score: f64) -> AbbreviationChoice;
}

impl<F> AbbreviationAuthority for F
where
    F: FnMut(&str, &str, f64) -> AbbreviationChoice,
{
    fn choose(&mut self, journal: &str, suggestion: &str, score: f64) -> AbbreviationChoice {
        self(journal, suggestion, score)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanFailure {
    pub key: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct CleanOutcome {
    /// Articles that had every required field.
    pub checked: usize,
    /// Entries whose title, fields, authors or pages changed.
    pub cleaned: usize,
    pub abbreviated: usize,
    pub failed: Vec<CleanFailure>,
    /// Abbreviations typed in during this run, by full journal name.
    pub custom: BTreeMap<String, String>,
    pub interrupted: bool,
}

/// Clean every entry in library order. Stops early, leaving the remaining
/// entries untouched, when the authority aborts.
pub fn clean_library(
    library: &mut Library,
    journals: &JournalAbbreviations,
    config: &CleanConfig,
    authority: &mut dyn AbbreviationAuthority,
) -> CleanOutcome {
    let mut cleaner = EntryCleaner {
        journals,
        config,
        history: HashMap::new(),
        outcome: CleanOutcome::default(),
    };

    let keys = library.keys().map(str::to_string).collect::<Vec<_>>();
    for key in keys {
        let Some(mut entry) = library.get(&key).cloned() else {
            continue;
        };
        let keep_going = cleaner.clean_entry(&mut entry, authority);
        if let Err(e) = library.replace(entry) {
            warn!(key = %key, error = %e, "cleaned entry could not be stored");
        }
        if !keep_going {
            info!(key = %key, "cleaning interrupted");
            break;
        }
    }
    cleaner.outcome
}

struct EntryCleaner<'a> {
    journals: &'a JournalAbbreviations,
    config: &'a CleanConfig,
    /// Journal name -> abbreviation applied this run, or `None` if declined.
    history: HashMap<String, Option<String>>,
    outcome: CleanOutcome,
}

impl EntryCleaner<'_> {
    /// Returns `false` once the authority has aborted.
    fn clean_entry(&mut self, entry: &mut Entry, authority: &mut dyn AbbreviationAuthority) -> bool {
        if !entry.is_article() {
            self.fail(entry, format!("not an article ({})", entry.entry_type));
            return true;
        }
        if let Some(missing) = REQUIRED_FIELDS.iter().find(|name| entry.non_empty(name).is_none()) {
            self.fail(entry, format!("missing {missing}"));
            return true;
        }
        self.outcome.checked += 1;

        let before = entry.clone();
        if let Some(title) = entry.value("title") {
            let cased = title_case(title);
            if cased != title {
                entry.set("title", &cased);
            }
        }
        for name in &self.config.remove_fields {
            entry.remove_field(name);
        }
        if let Some(authors) = entry.value("author").and_then(normalize_authors) {
            entry.set("author", &authors);
        }
        if let Some(pages) = entry.value("pages") {
            let standard = standardize_pages(pages);
            if standard != pages {
                entry.set("pages", &standard);
            }
        }
        if *entry != before {
            self.outcome.cleaned += 1;
        }

        self.abbreviate(entry, authority)
    }

    fn abbreviate(&mut self, entry: &mut Entry, authority: &mut dyn AbbreviationAuthority) -> bool {
        let Some(journal) = entry.non_empty("journal").map(str::to_string) else {
            return true;
        };
        if self.is_known_abbreviation(&journal) {
            debug!(key = %entry.key, journal = %journal, "journal already abbreviated");
            return true;
        }

        let abbreviation = match self.history.get(&journal) {
            Some(remembered) => remembered.clone(),
            None => match self.decide(&journal, authority) {
                Some(decision) => decision,
                None => {
                    self.outcome.interrupted = true;
                    return false;
                }
            },
        };

        if let Some(abbreviation) = abbreviation
            && abbreviation != journal
        {
            info!(journal = %journal, abbreviation = %abbreviation, "journal abbreviated");
            entry.set("journal", &abbreviation);
            self.history.insert(journal, Some(abbreviation));
            self.outcome.abbreviated += 1;
        }
        true
    }

    /// `None` on abort, `Some(None)` to keep the name as written.
    fn decide(
        &mut self,
        journal: &str,
        authority: &mut dyn AbbreviationAuthority,
    ) -> Option<Option<String>> {
        let journals = self.journals;
        let best = journals.best_match(journal);
        if let Some((abbreviation, score)) = best
            && score > self.config.auto_accept_score
        {
            return Some(Some(abbreviation.to_string()));
        }

        let (suggestion, score) = best.unwrap_or((journal, 0.0));
        match authority.choose(journal, suggestion, score) {
            AbbreviationChoice::Accept => Some(Some(suggestion.to_string())),
            AbbreviationChoice::Decline => {
                self.history.insert(journal.to_string(), None);
                Some(None)
            }
            AbbreviationChoice::Replace(custom) => {
                self.outcome.custom.insert(journal.to_string(), custom.clone());
                Some(Some(custom))
            }
            AbbreviationChoice::Abort => None,
        }
    }

    fn is_known_abbreviation(&self, journal: &str) -> bool {
        self.journals.is_abbreviation(journal)
            || self.history.values().flatten().any(|applied| applied == journal)
    }

    fn fail(&mut self, entry: &Entry, reason: String) {
        warn!(key = %entry.key, reason = %reason, "cannot clean entry");
        self.outcome.failed.push(CleanFailure {
            key: entry.key.clone(),
            reason,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doi2bib_core::bibtex::parse_str;

    fn journals() -> JournalAbbreviations {
        JournalAbbreviations::from_csv("Nano Letters,Nano Lett.\nPhysical Review B,Phys. Rev. B\n").unwrap()
    }

    fn never_asked() -> impl FnMut(&str, &str, f64) -> AbbreviationChoice {
        |journal: &str, _: &str, _: f64| -> AbbreviationChoice {
            panic!("unexpected question about {journal}")
        }
    }

    #[test]
    fn cleans_fields_and_applies_close_matches() {
        let mut library = parse_str(
            "@article{k, title = {charge transport in the dark}, author = {John Smith, Jane Doe},\n\
             journal = {Nano Letters}, pages = {1-10}, abstract = {Long}, url = {https://x}}",
        );
        let outcome = clean_library(&mut library, &journals(), &CleanConfig::default(), &mut never_asked());

        let entry = library.get("k").unwrap();
        assert_eq!(entry.value("title"), Some("Charge Transport in the Dark"));
        assert_eq!(entry.value("author"), Some("{John Smith} and {Jane Doe}"));
        assert_eq!(entry.value("journal"), Some("Nano Lett."));
        assert_eq!(entry.value("pages"), Some("1--10"));
        assert!(entry.get("abstract").is_none());
        assert!(entry.get("url").is_none());
        assert_eq!((outcome.checked, outcome.cleaned, outcome.abbreviated), (1, 1, 1));
        assert!(outcome.failed.is_empty());
    }

    #[test]
    fn non_articles_and_incomplete_entries_are_reported() {
        let mut library = parse_str(
            "@book{b, title = {a book}}\n@article{nj, title = {no journal}}\n",
        );
        let outcome = clean_library(&mut library, &journals(), &CleanConfig::default(), &mut never_asked());

        assert_eq!(outcome.checked, 0);
        let reasons = outcome
            .failed
            .iter()
            .map(|f| (f.key.as_str(), f.reason.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(reasons, vec![("b", "not an article (book)"), ("nj", "missing journal")]);
        assert_eq!(library.get("b").unwrap().value("title"), Some("a book"));
    }

    #[test]
    fn already_abbreviated_journals_are_left_alone() {
        let mut library = parse_str("@article{k, title = {T}, journal = {Phys. Rev. B}}");
        let outcome = clean_library(&mut library, &journals(), &CleanConfig::default(), &mut never_asked());
        assert_eq!(outcome.abbreviated, 0);
        assert_eq!(library.get("k").unwrap().value("journal"), Some("Phys. Rev. B"));
    }

    #[test]
    fn declined_journal_is_asked_about_once() {
        let mut library = parse_str(
            "@article{a, title = {A}, journal = {Journal of Kittens}}\n\
             @article{b, title = {B}, journal = {Journal of Kittens}}\n",
        );
        let mut asked = Vec::new();
        let mut authority = |journal: &str, _: &str, score: f64| {
            asked.push((journal.to_string(), score < 0.95));
            AbbreviationChoice::Decline
        };
        let outcome = clean_library(&mut library, &journals(), &CleanConfig::default(), &mut authority);

        assert_eq!(asked, vec![("Journal of Kittens".to_string(), true)]);
        assert_eq!(outcome.abbreviated, 0);
        assert_eq!(library.get("b").unwrap().value("journal"), Some("Journal of Kittens"));
    }

    #[test]
    fn typed_abbreviation_is_reused_and_reported_as_custom() {
        let mut library = parse_str(
            "@article{a, title = {A}, journal = {Journal of Kittens}}\n\
             @article{b, title = {B}, journal = {Journal of Kittens}}\n\
             @article{c, title = {C}, journal = {J. Kitt.}}\n",
        );
        let mut calls = 0;
        let mut authority = |_: &str, _: &str, _: f64| {
            calls += 1;
            AbbreviationChoice::Replace("J. Kitt.".to_string())
        };
        let outcome = clean_library(&mut library, &journals(), &CleanConfig::default(), &mut authority);

        assert_eq!(calls, 1);
        assert_eq!(outcome.abbreviated, 2);
        assert_eq!(outcome.custom.get("Journal of Kittens").map(String::as_str), Some("J. Kitt."));
        for key in ["a", "b", "c"] {
            assert_eq!(library.get(key).unwrap().value("journal"), Some("J. Kitt."));
        }
    }

    #[test]
    fn abort_stops_before_later_entries() {
        let mut library = parse_str(
            "@article{a, title = {first}, journal = {Journal of Kittens}}\n\
             @article{b, title = {second}, journal = {Nano Letters}}\n",
        );
        let outcome = clean_library(
            &mut library,
            &journals(),
            &CleanConfig::default(),
            &mut |_: &str, _: &str, _: f64| AbbreviationChoice::Abort,
        );

        assert!(outcome.interrupted);
        assert_eq!(outcome.checked, 1);
        assert_eq!(library.get("a").unwrap().value("title"), Some("First"));
        assert_eq!(library.get("b").unwrap().value("journal"), Some("Nano Letters"));
        assert_eq!(library.get("b").unwrap().value("title"), Some("second"));
    }
}
