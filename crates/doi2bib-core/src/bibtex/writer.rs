use std::path::Path;

use tracing::info;

use crate::error::Result;
use crate::models::{Delimiter, Entry, Library};
use crate::storage::backup_file;

const INDENT: &str = "    ";
const BLOCK_SEPARATOR: &str = "\n\n";

/// Serialize one entry as `@type{key,\n    name = {value},\n}`.
pub fn format_entry(entry: &Entry) -> String {
    let mut out = format!("@{}{{{},\n", entry.entry_type, entry.key);
    for field in &entry.fields {
        let value = match field.delimiter {
            Delimiter::Braces => format!("{{{}}}", field.value),
            Delimiter::Quotes => format!("\"{}\"", field.value),
            Delimiter::Bare => field.value.clone(),
        };
        out.push_str(&format!("{INDENT}{} = {value},\n", field.name));
    }
    out.push('}');
    out
}

/// Serialize a whole library: raw blocks, then entries in order, then any
/// blocks that failed to parse, so nothing from the input is silently lost.
pub fn write_string(library: &Library) -> String {
    let blocks = library
        .blocks
        .iter()
        .map(|block| block.text.trim().to_string())
        .chain(library.entries().iter().map(format_entry))
        .chain(
            library
                .failed_blocks
                .iter()
                .map(|failed| failed.raw.trim().to_string()),
        )
        .collect::<Vec<_>>();

    let mut out = blocks.join(BLOCK_SEPARATOR);
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

/// Write a library to disk, backing up an existing file to `<path>.bak` first.
pub fn write_file(library: &Library, path: &Path) -> Result<()> {
    if let Some(backup) = backup_file(path)? {
        info!(backup = %backup.display(), "backed up existing library");
    }
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, write_string(library))?;
    info!(path = %path.display(), entries = library.len(), "library written");
    Ok(())
}
