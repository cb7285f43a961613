use std::path::{Path, PathBuf};

use tracing::{error, info};

use doi2bib_core::storage::{backup_file, write_if_changed};

use crate::dedup::KeyMap;
use crate::error::Result;

/// Replace `old` with `new` wherever it is a whole citation token: preceded
/// by `{` or `,` and followed by `,` or `}`.
pub fn replace_token(text: &str, old: &str, new: &str) -> String {
    if old.is_empty() {
        return text.to_string();
    }
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for (start, _) in text.match_indices(old) {
        let end = start + old.len();
        let opens = start > 0 && matches!(bytes[start - 1], b'{' | b',');
        let closes = matches!(bytes.get(end), Some(b',' | b'}'));
        if opens && closes {
            out.push_str(&text[last..start]);
            out.push_str(new);
            last = end;
        }
    }
    out.push_str(&text[last..]);
    out
}

/// Apply every mapping in the key map to a document's text.
pub fn rewrite_text(text: &str, key_map: &KeyMap) -> String {
    key_map
        .iter()
        .fold(text.to_string(), |acc, (old, new)| replace_token(&acc, old, new))
}

#[derive(Debug, Clone, Default)]
pub struct RewriteReport {
    pub rewritten: Vec<PathBuf>,
    pub unchanged: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
    pub backups: Vec<PathBuf>,
}

/// Rewrite citation keys in each document. Every document is backed up to
/// `<name>.bak` first, even if nothing changes, and written only when its
/// text changed. A failing document is reported and the rest still run.
pub fn rewrite_documents(paths: &[impl AsRef<Path>], key_map: &KeyMap) -> RewriteReport {
    let mut report = RewriteReport::default();
    for path in paths {
        let path = path.as_ref();
        match rewrite_document(path, key_map, &mut report.backups) {
            Ok(true) => {
                info!(path = %path.display(), "citations rewritten");
                report.rewritten.push(path.to_path_buf());
            }
            Ok(false) => report.unchanged.push(path.to_path_buf()),
            Err(e) => {
                error!(path = %path.display(), error = %e, "could not rewrite document");
                report.failed.push((path.to_path_buf(), e.to_string()));
            }
        }
    }
    report
}

fn rewrite_document(path: &Path, key_map: &KeyMap, backups: &mut Vec<PathBuf>) -> Result<bool> {
    if let Some(backup) = backup_file(path)? {
        backups.push(backup);
    }
    let text = std::fs::read_to_string(path)?;
    let rewritten = rewrite_text(&text, key_map);
    if rewritten == text {
        return Ok(false);
    }
    Ok(write_if_changed(path, &rewritten)?)
}
