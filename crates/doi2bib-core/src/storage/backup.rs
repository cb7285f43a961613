use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// `refs.bib` -> `refs.bib.bak`, `paper.tex` -> `paper.tex.bak`.
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".bak");
    PathBuf::from(name)
}

/// Copy `path` to its `.bak` sibling, overwriting a previous backup.
/// Returns `None` when there is nothing to back up.
pub fn backup_file(path: &Path) -> Result<Option<PathBuf>> {
    if !path.exists() {
        return Ok(None);
    }
    let backup = backup_path(path);
    fs::copy(path, &backup)?;
    Ok(Some(backup))
}

/// Write `contents` only if they differ from what is on disk.
/// Returns whether the file was written.
pub fn write_if_changed(path: &Path, contents: &str) -> Result<bool> {
    if let Ok(current) = fs::read_to_string(path)
        && current == contents
    {
        return Ok(false);
    }
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_backup_path_appends_suffix() {
        assert_eq!(
            backup_path(Path::new("/tmp/paper.tex")),
            PathBuf::from("/tmp/paper.tex.bak")
        );
        assert_eq!(backup_path(Path::new("refs")), PathBuf::from("refs.bak"));
    }

    #[test]
    fn test_backup_file_copies_and_overwrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("refs.bib");
        fs::write(&path, "first").unwrap();
        let backup = backup_file(&path).unwrap().unwrap();
        assert_eq!(fs::read_to_string(&backup).unwrap(), "first");

        fs::write(&path, "second").unwrap();
        backup_file(&path).unwrap();
        assert_eq!(fs::read_to_string(&backup).unwrap(), "second");
    }

    #[test]
    fn test_backup_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(backup_file(&dir.path().join("nope.bib")).unwrap().is_none());
    }

    #[test]
    fn test_write_if_changed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("a.tex");
        assert!(write_if_changed(&path, "x").unwrap());
        assert!(!write_if_changed(&path, "x").unwrap());
        assert!(write_if_changed(&path, "y").unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "y");
    }
}
