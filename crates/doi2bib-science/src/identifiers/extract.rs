use std::collections::HashSet;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::Result;
use crate::identifiers::doi::Doi;

static DOI_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)10\.\d{4,9}/[-._;()/:A-Z0-9]*[A-Z0-9/]").unwrap()
});

/// Every DOI in `text`, de-duplicated (case-insensitively) in first-seen order.
pub fn extract_dois_from_text(text: &str) -> Vec<Doi> {
    let mut seen = HashSet::new();
    DOI_REGEX
        .find_iter(text)
        .filter_map(|m| Doi::parse(m.as_str()).ok())
        .filter(|doi| seen.insert(doi.clone()))
        .collect()
}

/// Read a file (any text format) and extract the DOIs it mentions.
pub fn read_dois_from_file(path: &Path) -> Result<Vec<Doi>> {
    let bytes = std::fs::read(path)?;
    Ok(extract_dois_from_text(&String::from_utf8_lossy(&bytes)))
}
