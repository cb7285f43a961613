mod bibtexdb;
mod llm_config;
mod summary;
mod terminal;
mod tex;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use crossterm::style::Stylize;
use tracing::warn;
use tracing_subscriber::{EnvFilter, fmt};

use doi2bib_core::{AppConfig, ExitCode, Library};
use doi2bib_science::dedup::ORACLE_FALLBACK_WARNING;
use doi2bib_science::{LlmOracle, Throttle};

// ─── CLI Definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "doi2bib",
    about = "Build and reconcile BibTeX libraries from DOIs",
    version,
    long_about = None
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOpts,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalOpts {
    /// DOIs to resolve, comma-separated.
    #[arg(long, global = true, value_delimiter = ',')]
    pub dois: Vec<String>,

    /// Search a text file for DOIs.
    #[arg(long, global = true)]
    pub doifile: Option<PathBuf>,

    /// BibTeX database to use as input; otherwise start from an empty library.
    #[arg(long, global = true)]
    pub bibtexdb: Option<PathBuf>,

    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Warning)]
    pub loglevel: LogLevel,

    /// Also fetch the works the input DOIs reference.
    #[arg(long, global = true)]
    pub cited: bool,

    /// Also fetch the works that cite the input DOIs.
    #[arg(long, global = true)]
    pub citing: bool,

    /// Reasoning model from the config to use instead of the default.
    #[arg(long, global = true)]
    pub llm_model: Option<String>,

    /// Download the journal abbreviation list again instead of using the cache.
    #[arg(long, global = true)]
    pub refresh: bool,

    /// URL of the journal abbreviation list (JabRef CSV).
    #[arg(long, global = true)]
    pub database: Option<String>,

    /// Extra abbreviation as 'Full Name;Abbrev.'; may be repeated.
    #[arg(long, global = true)]
    pub custom: Vec<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warn",
            Self::Error => "error",
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve DOIs into a BibTeX database.
    Bibtexdb {
        /// Additional DOIs.
        more_dois: Vec<String>,

        /// File to write (defaults to --bibtexdb, else doi2bib.bib).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Find and resolve duplicate entries.
        #[arg(long)]
        dedupe: bool,

        /// Ask the reasoning model about entries with similar titles.
        #[arg(long)]
        llm: bool,

        /// Tidy articles and abbreviate journal names.
        #[arg(long)]
        clean: bool,
    },

    /// Tools for LaTeX documents.
    Tex {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Consolidate citations of duplicate entries.
        #[arg(long)]
        check_cites: bool,

        #[arg(long)]
        llm: bool,
    },

    /// Manage configured reasoning models.
    LlmConfig {
        #[arg(value_enum)]
        action: LlmAction,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum LlmAction {
    List,
    Add,
    Rm,
    Default,
}

// ─── Main ────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.global.loglevel);

    let mut config = AppConfig::load()?;

    match cli.command {
        Commands::Bibtexdb {
            more_dois,
            out,
            dedupe,
            llm,
            clean,
        } => {
            let out = out
                .or_else(|| cli.global.bibtexdb.clone())
                .unwrap_or_else(|| PathBuf::from("doi2bib.bib"));
            let summary = bibtexdb::run(
                &mut config,
                &cli.global,
                bibtexdb::Options {
                    more_dois,
                    out,
                    dedupe,
                    llm,
                    clean,
                },
            )
            .await?;
            summary.print();
        }

        Commands::Tex {
            files,
            check_cites,
            llm,
        } => {
            let Some(bibtexdb) = cli.global.bibtexdb.clone() else {
                eprintln!("{}", "tex requires --bibtexdb".red());
                std::process::exit(ExitCode::InvalidArgs as i32);
            };
            let summary = tex::run(&config, &cli.global, &bibtexdb, &files, check_cites, llm).await?;
            summary.print();
        }

        Commands::LlmConfig { action } => {
            if let Err(e) = llm_config::run(&mut config, action) {
                eprintln!("{}", e.to_string().red());
                std::process::exit(ExitCode::GeneralError as i32);
            }
        }
    }

    Ok(())
}

// ─── Helpers ────────────────────────────────────────────────────────────────

fn init_tracing(level: LogLevel) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.directive()));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Parse the library at `path`, or start empty when there is none.
fn load_library(path: Option<&std::path::Path>) -> Result<Library> {
    match path {
        Some(path) if path.exists() => Ok(doi2bib_core::bibtex::parse_file(path)?),
        Some(path) => {
            println!("{} {}", "Starting a new library at".yellow(), path.display());
            Ok(Library::new())
        }
        None => Ok(Library::new()),
    }
}

/// The reasoning-model oracle, or the fallback warning when it cannot be set up.
fn build_oracle(
    config: &AppConfig,
    model: Option<&str>,
) -> std::result::Result<LlmOracle, String> {
    match doi2bib_ai::build_provider(&config.llm, model) {
        Ok(provider) => Ok(LlmOracle::new(
            provider,
            Arc::new(Throttle::per_second(config.llm.oracle_calls_per_second)),
        )),
        Err(e) => {
            warn!(error = %e, "could not set up the reasoning model");
            Err(format!("{ORACLE_FALLBACK_WARNING} ({e})"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::parse_from([
            "doi2bib",
            "--dois",
            "10.1/a, 10.1/b",
            "bibtexdb",
            "10.1/c",
            "--dedupe",
            "--bibtexdb",
            "refs.bib",
        ]);
        assert_eq!(cli.global.dois, vec!["10.1/a", " 10.1/b"]);
        assert_eq!(cli.global.bibtexdb, Some(PathBuf::from("refs.bib")));
        assert_eq!(cli.global.loglevel, LogLevel::Warning);
        match cli.command {
            Commands::Bibtexdb { more_dois, dedupe, llm, out, clean } => {
                assert_eq!(more_dois, vec!["10.1/c"]);
                assert!(dedupe);
                assert!(!llm);
                assert!(!clean);
                assert!(out.is_none());
            }
            _ => panic!("expected bibtexdb"),
        }
    }

    #[test]
    fn clean_flags_and_repeated_customs() {
        let cli = Cli::parse_from([
            "doi2bib",
            "bibtexdb",
            "--clean",
            "--refresh",
            "--custom",
            "Journal of Kittens;J. Kitt.",
            "--custom",
            "Cat Reviews;Cat Rev.",
        ]);
        assert!(cli.global.refresh);
        assert!(cli.global.database.is_none());
        assert_eq!(cli.global.custom, vec!["Journal of Kittens;J. Kitt.", "Cat Reviews;Cat Rev."]);
        assert!(matches!(cli.command, Commands::Bibtexdb { clean: true, .. }));
    }

    #[test]
    fn llm_config_actions() {
        let cli = Cli::parse_from(["doi2bib", "llm-config", "rm"]);
        assert!(matches!(cli.command, Commands::LlmConfig { action: LlmAction::Rm }));
    }

    #[test]
    fn missing_library_starts_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let library = load_library(Some(dir.path().join("new.bib").as_path())).unwrap();
        assert!(library.is_empty());
    }
}
