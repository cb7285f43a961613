//! Field-level text normalisation used by the entry cleaner.

/// Words left lowercase unless they open or close the title or follow a colon.
const SMALL_WORDS: &[&str] = &[
    "a", "an", "and", "as", "at", "but", "by", "en", "for", "if", "in", "nor", "of", "on", "or",
    "per", "the", "to", "v", "v.", "via", "vs", "vs.",
];

/// Title-case a BibTeX title.
///
/// Braced groups and LaTeX commands are left alone, as are words that already
/// carry capitals after their first letter (`mRNA`, `DNA`, `McDonald`). An
/// all-caps title is lowered first so its words are not all mistaken for
/// acronyms.
pub fn title_case(title: &str) -> String {
    let source = if title.chars().any(char::is_lowercase) {
        title.to_string()
    } else {
        title.to_lowercase()
    };

    let words = source.split(' ').collect::<Vec<_>>();
    let first = words.iter().position(|w| !w.is_empty());
    let last = words.iter().rposition(|w| !w.is_empty());

    let mut depth = 0usize;
    let mut after_colon = false;
    let mut out = Vec::with_capacity(words.len());
    for (idx, word) in words.iter().enumerate() {
        let protected = depth > 0 || word.starts_with('{') || word.starts_with('\\');
        depth = brace_depth_after(word, depth);
        if word.is_empty() {
            out.push(String::new());
            continue;
        }

        let edge = Some(idx) == first || Some(idx) == last || after_colon;
        after_colon = word.ends_with(':');

        out.push(if protected || keeps_own_case(word) {
            word.to_string()
        } else if !edge && SMALL_WORDS.contains(&bare(word).to_lowercase().as_str()) {
            word.to_lowercase()
        } else {
            word.split('-').map(capitalize).collect::<Vec<_>>().join("-")
        });
    }
    out.join(" ")
}

fn brace_depth_after(word: &str, mut depth: usize) -> usize {
    let mut prev = '\0';
    for c in word.chars() {
        match c {
            '{' if prev != '\\' => depth += 1,
            '}' if prev != '\\' => depth = depth.saturating_sub(1),
            _ => {}
        }
        prev = c;
    }
    depth
}

/// Inner capitals (`mRNA`, `iPhone`) or dotted abbreviations (`e.g.`).
fn keeps_own_case(word: &str) -> bool {
    let letters = word.trim_matches(|c: char| !c.is_alphanumeric());
    let inner_caps = letters.chars().skip(1).any(char::is_uppercase);
    let dotted = letters.trim_end_matches('.').contains('.');
    inner_caps || dotted
}

fn bare(word: &str) -> &str {
    word.trim_matches(|c: char| !c.is_alphanumeric() && c != '.')
}

/// Uppercase the first letter, leaving any leading punctuation in place.
fn capitalize(part: &str) -> String {
    let mut done = false;
    part.chars()
        .map(|c| {
            if !done && c.is_alphabetic() {
                done = true;
                c.to_uppercase().collect::<String>()
            } else {
                c.to_string()
            }
        })
        .collect()
}

/// Turn a comma-separated author list into BibTeX's `and`-separated form,
/// bracing each name. `Smith, J.` (one author, last name first) is left as is.
pub fn normalize_authors(authors: &str) -> Option<String> {
    if authors.contains(" and ") || !authors.contains(',') {
        return None;
    }
    let names = authors
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .collect::<Vec<_>>();
    let is_list = names.len() >= 3 || names.iter().all(|name| name.contains(' '));
    if names.len() < 2 || !is_list {
        return None;
    }
    Some(
        names
            .iter()
            .map(|name| format!("{{{name}}}"))
            .collect::<Vec<_>>()
            .join(" and "),
    )
}

/// `100-110` -> `100--110`. Single pages and ranges already written with a
/// double hyphen are unchanged.
pub fn standardize_pages(pages: &str) -> String {
    let pages = pages
        .replace(r"{\textendash}", "--")
        .replace(r"\textendash{}", "--")
        .replace('\u{2013}', "--");
    let parts = pages.split('-').map(str::trim).collect::<Vec<_>>();
    match parts.as_slice() {
        [_] | [_, "", _] => pages.trim().to_string(),
        [first, .., last] => format!("{first}--{last}"),
        [] => String::new(),
    }
}
