use std::fmt::Write as _;
use std::path::PathBuf;

use crossterm::style::Stylize;

use doi2bib_science::FailureRecord;

/// Counts and failures gathered over one run, printed at the end.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub parsed: usize,
    pub added: usize,
    pub cleaned: usize,
    pub abbreviated: usize,
    pub removed: usize,
    pub rewritten: usize,
    pub warnings: Vec<String>,
    pub failed_blocks: Vec<String>,
    /// `key: reason` for entries the cleaner skipped.
    pub clean_failures: Vec<String>,
    pub fetch_failures: Vec<FailureRecord>,
    pub rewrite_failures: Vec<(PathBuf, String)>,
}

impl RunSummary {
    pub fn failed(&self) -> usize {
        self.failed_blocks.len()
            + self.clean_failures.len()
            + self.fetch_failures.len()
            + self.rewrite_failures.len()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "parsed {}, added {}, cleaned {}, abbreviated {}, removed {}, rewritten {}, failed {}",
            self.parsed,
            self.added,
            self.cleaned,
            self.abbreviated,
            self.removed,
            self.rewritten,
            self.failed()
        );
        for warning in &self.warnings {
            let _ = writeln!(out, "warning: {warning}");
        }
        if !self.failed_blocks.is_empty() {
            let _ = writeln!(out, "{} blocks could not be parsed:", self.failed_blocks.len());
            for label in &self.failed_blocks {
                let _ = writeln!(out, "  • {label}");
            }
        }
        if !self.clean_failures.is_empty() {
            let _ = writeln!(out, "{} entries could not be cleaned:", self.clean_failures.len());
            for failure in &self.clean_failures {
                let _ = writeln!(out, "  • {failure}");
            }
        }
        if !self.fetch_failures.is_empty() {
            let _ = writeln!(out, "{} fetches failed:", self.fetch_failures.len());
            for failure in &self.fetch_failures {
                let _ = writeln!(out, "  • {}: {}", failure.url, failure.message);
            }
        }
        if !self.rewrite_failures.is_empty() {
            let _ = writeln!(out, "{} documents could not be rewritten:", self.rewrite_failures.len());
            for (path, message) in &self.rewrite_failures {
                let _ = writeln!(out, "  • {}: {message}", path.display());
            }
        }
        out
    }

    pub fn print(&self) {
        let text = self.render();
        if self.failed() > 0 || !self.warnings.is_empty() {
            eprint!("{}", text.as_str().red());
        } else {
            print!("{}", text.as_str().cyan());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_every_failure() {
        let summary = RunSummary {
            parsed: 3,
            added: 1,
            cleaned: 2,
            abbreviated: 1,
            failed_blocks: vec!["broken".to_string()],
            clean_failures: vec!["b: not an article (book)".to_string()],
            rewrite_failures: vec![(PathBuf::from("gone.tex"), "No such file".to_string())],
            ..RunSummary::default()
        };
        let text = summary.render();
        assert!(text.starts_with(
            "parsed 3, added 1, cleaned 2, abbreviated 1, removed 0, rewritten 0, failed 3\n"
        ));
        assert!(text.contains("  • broken\n"));
        assert!(text.contains("1 entries could not be cleaned:\n  • b: not an article (book)\n"));
        assert!(text.contains("  • gone.tex: No such file\n"));
        assert!(!text.contains("fetches failed"));
    }
}
