use tracing::debug;

use doi2bib_core::Library;

/// Remove every listed key from the library. Keys that are absent, or listed
/// twice, are ignored. Returns how many entries were actually removed.
pub fn apply<'a>(library: &mut Library, removal: impl IntoIterator<Item = &'a str>) -> usize {
    let mut removed = 0;
    for key in removal {
        if library.remove(key).is_some() {
            debug!(key, "removed entry");
            removed += 1;
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use doi2bib_core::Entry;

    #[test]
    fn removal_is_idempotent() {
        let mut lib = Library::new();
        for key in ["a", "b", "c"] {
            lib.add(Entry::new("article", key)).unwrap();
        }
        assert_eq!(apply(&mut lib, ["b", "b", "zzz"]), 1);
        assert_eq!(apply(&mut lib, ["b"]), 0);
        assert_eq!(lib.keys().collect::<Vec<_>>(), vec!["a", "c"]);
    }
}
