use std::path::{Path, PathBuf};

use anyhow::Result;
use crossterm::style::Stylize;

use doi2bib_core::AppConfig;
use doi2bib_science::tex::find_citation_keys_in_files;
use doi2bib_science::{SimilarityOracle, check_tex_cites};

use crate::summary::RunSummary;
use crate::terminal::TerminalAuthority;
use crate::{GlobalOpts, build_oracle, load_library};

pub async fn run(
    config: &AppConfig,
    global: &GlobalOpts,
    bibtexdb: &Path,
    files: &[PathBuf],
    check_cites: bool,
    llm: bool,
) -> Result<RunSummary> {
    let library = load_library(Some(bibtexdb))?;
    let mut summary = RunSummary {
        parsed: library.len(),
        failed_blocks: library
            .failed_blocks
            .iter()
            .map(|failed| failed.label().to_string())
            .collect(),
        ..RunSummary::default()
    };

    if !check_cites {
        let keys = find_citation_keys_in_files(files)?;
        println!("{} citation keys:", keys.len());
        for key in keys {
            let marker = if library.contains(&key) { " " } else { "?" };
            println!("  {marker} {key}");
        }
        return Ok(summary);
    }

    let oracle = if llm {
        match build_oracle(config, global.llm_model.as_deref()) {
            Ok(oracle) => Some(oracle),
            Err(warning) => {
                summary.warnings.push(warning);
                None
            }
        }
    } else {
        None
    };

    let outcome = check_tex_cites(
        files,
        &library,
        oracle.as_ref().map(|o| o as &dyn SimilarityOracle),
        &config.dedupe,
        &mut TerminalAuthority,
    )
    .await?;

    for key in &outcome.unknown_keys {
        summary.warnings.push(format!("cited key '{key}' is not in {}", bibtexdb.display()));
    }
    summary.warnings.extend(outcome.dedupe.warnings.iter().cloned());
    for key in &outcome.stale_keys {
        summary
            .warnings
            .push(format!("'{key}' is still cited; citations with spaces after commas are not rewritten"));
    }
    summary.removed = outcome.dedupe.resolution.removed.len();

    match outcome.rewrite {
        None => println!("{}", "No duplicate citations found.".cyan()),
        Some(report) => {
            for path in &report.rewritten {
                println!("{} {}", "Updated citations in".yellow(), path.display().to_string().cyan());
            }
            summary.rewritten = report.rewritten.len();
            summary.rewrite_failures = report.failed;
        }
    }

    Ok(summary)
}
