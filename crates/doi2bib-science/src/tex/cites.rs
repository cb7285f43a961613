use std::collections::HashSet;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::error::Result;

/// `\cite`, `\citep`, `\autocite*`, `\parencite[see][12]{a, b}` and friends.
static CITE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\\[A-Za-z]*cite[A-Za-z]*\*?(?:\s*\[[^\]]*\])*\s*\{([^}]*)\}").unwrap()
});

/// Citation keys in the given documents, trimmed and de-duplicated in
/// first-seen order. `\nocite{*}` contributes nothing.
pub fn find_citation_keys<'a>(texts: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut keys = Vec::new();
    for text in texts {
        for caps in CITE_REGEX.captures_iter(text) {
            for key in caps[1].split(',').map(str::trim) {
                if key.is_empty() || key == "*" {
                    continue;
                }
                if seen.insert(key.to_string()) {
                    keys.push(key.to_string());
                }
            }
        }
    }
    keys
}

pub fn find_citation_keys_in_files(paths: &[impl AsRef<Path>]) -> Result<Vec<String>> {
    let texts = paths
        .iter()
        .map(|path| {
            let path = path.as_ref();
            debug!(path = %path.display(), "scanning for citations");
            std::fs::read_to_string(path)
        })
        .collect::<std::io::Result<Vec<_>>>()?;
    Ok(find_citation_keys(texts.iter().map(String::as_str)))
}
