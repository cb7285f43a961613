use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, ScienceError};

/// Full journal names mapped to their abbreviations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JournalAbbreviations {
    by_name: BTreeMap<String, String>,
}

impl JournalAbbreviations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse JabRef-style rows of `full name,abbreviation` without a header.
    /// Older lists separate the columns with `;`; that is detected from the
    /// first non-blank line. Columns past the second are ignored.
    pub fn from_csv(text: &str) -> Result<Self> {
        let delimiter = match text.lines().find(|line| !line.trim().is_empty()) {
            Some(line) if line.contains(';') => b';',
            _ => b',',
        };
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let mut journals = Self::new();
        for record in reader.records() {
            let record = record.map_err(|e| ScienceError::Parse(format!("journal list: {e}")))?;
            match (record.get(0), record.get(1)) {
                (Some(full), Some(abbrev)) if !full.is_empty() && !abbrev.is_empty() => {
                    journals.insert(full, abbrev);
                }
                _ => debug!(row = ?record, "skipping journal row"),
            }
        }
        Ok(journals)
    }

    /// `"Journal of Kittens;J. Kitt."` as given to `--custom`.
    pub fn parse_custom(spec: &str) -> Option<(String, String)> {
        let (full, abbrev) = spec.split_once(';')?;
        let (full, abbrev) = (full.trim(), abbrev.trim());
        (!full.is_empty() && !abbrev.is_empty()).then(|| (full.to_string(), abbrev.to_string()))
    }

    pub fn insert(&mut self, full: impl Into<String>, abbrev: impl Into<String>) {
        self.by_name.insert(full.into(), abbrev.into());
    }

    pub fn extend<I, K, V>(&mut self, pairs: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (full, abbrev) in pairs {
            self.insert(full, abbrev);
        }
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Whether `journal` is already one of the known abbreviations.
    pub fn is_abbreviation(&self, journal: &str) -> bool {
        self.by_name.values().any(|abbrev| abbrev == journal)
    }

    /// The abbreviation whose full name or abbreviation is closest to
    /// `journal`, with its normalized Levenshtein similarity in `0.0..=1.0`.
    /// Ties keep the first candidate in name order.
    pub fn best_match(&self, journal: &str) -> Option<(&str, f64)> {
        let mut best: Option<(&str, f64)> = None;
        for (full, abbrev) in &self.by_name {
            let score = strsim::normalized_levenshtein(journal, full)
                .max(strsim::normalized_levenshtein(journal, abbrev));
            if best.is_none_or(|(_, top)| score > top) {
                best = Some((abbrev.as_str(), score));
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "\
Journal of the American Chemical Society,J. Am. Chem. Soc.
\"Journal of Physics A: Mathematical and General, Letters\",J. Phys. A: Math. Gen. Lett.,extra
Nano Letters,Nano Lett.

orphan row
";

    #[test]
    fn reads_comma_separated_rows() {
        let journals = JournalAbbreviations::from_csv(CSV).unwrap();
        assert_eq!(journals.len(), 3);
        assert!(journals.is_abbreviation("J. Phys. A: Math. Gen. Lett."));
        assert!(!journals.is_abbreviation("Nano Letters"));
    }

    #[test]
    fn reads_semicolon_separated_rows() {
        let journals = JournalAbbreviations::from_csv("Nano Letters;Nano Lett.\nACS Nano;ACS Nano\n").unwrap();
        assert_eq!(journals.len(), 2);
        assert!(journals.is_abbreviation("Nano Lett."));
    }

    #[test]
    fn best_match_scores_full_names_and_abbreviations() {
        let journals = JournalAbbreviations::from_csv(CSV).unwrap();

        let (abbrev, score) = journals.best_match("Nano Letters").unwrap();
        assert_eq!(abbrev, "Nano Lett.");
        assert_eq!(score, 1.0);

        let (abbrev, score) = journals.best_match("J. Am. Chem. Soc").unwrap();
        assert_eq!(abbrev, "J. Am. Chem. Soc.");
        assert!(score > 0.9 && score < 1.0);

        assert!(JournalAbbreviations::new().best_match("Nature").is_none());
    }

    #[test]
    fn custom_specs_split_on_semicolon() {
        assert_eq!(
            JournalAbbreviations::parse_custom("Journal of Kittens; J. Kitt."),
            Some(("Journal of Kittens".to_string(), "J. Kitt.".to_string()))
        );
        assert_eq!(JournalAbbreviations::parse_custom("no separator"), None);
        assert_eq!(JournalAbbreviations::parse_custom("Full;"), None);
    }
}
