use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crossterm::style::Stylize;
use futures::StreamExt;
use tracing::{debug, info, warn};

use doi2bib_core::{AppConfig, Library};
use doi2bib_science::sources::user_agent;
use doi2bib_science::{
    DedupePlan, DiskCache, Doi, DoiOrgClient, FailureLog, JournalAbbreviations, JournalListClient,
    OpenAlexClient, SimilarityOracle, Throttle, clean_library, dedupe_library, read_dois_from_file,
};

use crate::summary::RunSummary;
use crate::terminal::{TerminalAbbreviationAuthority, TerminalAuthority, ask_yes_no};
use crate::{GlobalOpts, build_oracle, load_library};

pub struct Options {
    pub more_dois: Vec<String>,
    pub out: PathBuf,
    pub dedupe: bool,
    pub llm: bool,
    pub clean: bool,
}

/// Abbreviations added during a run are saved to `config`.
pub async fn run(config: &mut AppConfig, global: &GlobalOpts, options: Options) -> Result<RunSummary> {
    let mut summary = RunSummary::default();

    let mut library = load_library(global.bibtexdb.as_deref())?;
    summary.parsed = library.len();
    summary.failed_blocks = library
        .failed_blocks
        .iter()
        .map(|failed| failed.label().to_string())
        .collect();
    debug!(entries = library.len(), "library loaded");

    let failures = Arc::new(FailureLog::new());
    let mut dois = collect_dois(global, &options.more_dois)?;
    if global.cited || global.citing {
        let openalex = openalex_client(config, failures.clone())?;
        if global.cited {
            dois = openalex.expand_cited(&dois).await;
        }
        if global.citing {
            dois = openalex.expand_citing(&dois).await;
        }
    }

    let dois = new_dois(&library, dois);
    if !dois.is_empty() {
        let doi_org = doi_org_client(config, failures.clone())?;
        summary.added = add_resolved(&mut library, &doi_org, dois, config).await;
        if summary.added > 0 {
            println!("{} {} DOIs.", "Updated library with".cyan(), summary.added);
        }
    }

    if options.clean {
        clean_entries(config, global, &mut library, failures.clone(), &mut summary).await?;
    }
    summary.fetch_failures = failures.entries();

    if options.dedupe {
        let oracle = if options.llm {
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
        let plan = DedupePlan::build(
            &library,
            oracle.as_ref().map(|o| o as &dyn SimilarityOracle),
            &config.dedupe,
        )
        .await;
        let outcome = dedupe_library(&mut library, &plan, &mut TerminalAuthority);
        summary.removed = outcome.resolution.removed.len();
        summary.warnings.extend(outcome.warnings);
        if outcome.resolution.interrupted {
            summary.warnings.push("deduplication interrupted; later groups were left as they were".to_string());
        }
    }

    if library.is_empty() {
        println!("{}", "Not writing empty library to file.".yellow().bold());
    } else if ask_yes_no(&format!("Save library to {}?", options.out.display()))? {
        doi2bib_core::bibtex::write_file(&library, &options.out)?;
        println!("{} {}", "Wrote".yellow().bold(), options.out.display().to_string().cyan());
    }

    Ok(summary)
}

/// DOIs from `--dois`, positional arguments and `--doifile`, in that order,
/// without repeats. Unparseable values are logged and dropped.
fn collect_dois(global: &GlobalOpts, more: &[String]) -> Result<Vec<Doi>> {
    let mut dois = Vec::new();
    for raw in global.dois.iter().chain(more).map(|s| s.trim()) {
        if raw.is_empty() {
            continue;
        }
        match Doi::parse(raw) {
            Ok(doi) => dois.push(doi),
            Err(e) => warn!(input = raw, error = %e, "skipping invalid DOI"),
        }
    }
    if let Some(path) = &global.doifile {
        let found = read_dois_from_file(path)?;
        info!(path = %path.display(), found = found.len(), "DOIs found in file");
        dois.extend(found);
    }
    let mut seen = HashSet::new();
    dois.retain(|doi| seen.insert(doi.clone()));
    Ok(dois)
}

/// Drop DOIs whose entries are already in the library.
fn new_dois(library: &Library, dois: Vec<Doi>) -> Vec<Doi> {
    let present = library
        .entries()
        .iter()
        .filter_map(|entry| entry.non_empty("doi"))
        .filter_map(|value| Doi::parse(value).ok())
        .collect::<HashSet<_>>();
    dois.into_iter()
        .filter(|doi| {
            let known = present.contains(doi);
            if known {
                debug!(%doi, "already in library");
            }
            !known
        })
        .collect()
}

/// Resolve DOIs concurrently and add the entries in input order. Key
/// collisions get a numeric suffix. Returns how many entries were added.
async fn add_resolved(
    library: &mut Library,
    client: &DoiOrgClient,
    dois: Vec<Doi>,
    config: &AppConfig,
) -> usize {
    let in_flight = config.fetch.doi_requests_per_second.max(1) as usize;
    let mut resolved = futures::stream::iter(dois)
        .map(|doi| async move { client.resolve(&doi).await })
        .buffered(in_flight);

    let mut added = 0;
    while let Some(entry) = resolved.next().await {
        let Some(entry) = entry else { continue };
        let original = entry.key.clone();
        let key = library.add_disambiguated(entry);
        if key != original {
            info!(original = %original, key = %key, "duplicate key renamed");
        }
        added += 1;
    }
    added
}

/// Fill missing pages, then clean every article. Runs before deduplication
/// so duplicates are compared on cleaned fields.
async fn clean_entries(
    config: &mut AppConfig,
    global: &GlobalOpts,
    library: &mut Library,
    failures: Arc<FailureLog>,
    summary: &mut RunSummary,
) -> Result<()> {
    let (journals, mut custom) = load_journals(config, global).await?;
    if journals.is_empty() {
        println!("{}", "No journals parsed, cannot clean.".red().bold());
        summary.warnings.push("no journal abbreviations loaded; entries were not cleaned".to_string());
        return Ok(());
    }

    let doi_org = doi_org_client(config, failures)?;
    let filled = fill_missing_pages(library, &doi_org).await;
    debug!(filled, "pages looked up before cleaning");

    let outcome = clean_library(
        library,
        &journals,
        &config.clean,
        &mut TerminalAbbreviationAuthority,
    );
    summary.cleaned = outcome.cleaned;
    summary.abbreviated = outcome.abbreviated;
    summary.clean_failures = outcome
        .failed
        .iter()
        .map(|failure| format!("{}: {}", failure.key, failure.reason))
        .collect();
    if outcome.interrupted {
        summary.warnings.push("cleaning interrupted; later entries were left as they were".to_string());
    }

    custom.extend(outcome.custom);
    custom.retain(|full, abbrev| config.clean.custom.get(full) != Some(&*abbrev));
    if !custom.is_empty() {
        info!(count = custom.len(), "saving custom abbreviations");
        config.clean.custom.extend(custom);
        if let Err(e) = config.save() {
            warn!(error = %e, "could not save custom abbreviations");
            summary.warnings.push(format!("custom abbreviations were not saved ({e})"));
        }
    }
    Ok(())
}

/// The downloaded (or cached) list plus saved and `--custom` abbreviations.
/// Also returns the `--custom` pairs so they can be saved.
async fn load_journals(
    config: &AppConfig,
    global: &GlobalOpts,
) -> Result<(JournalAbbreviations, BTreeMap<String, String>)> {
    let url = global.database.as_deref().unwrap_or(&config.clean.database_url);
    let mut journals = match journal_list_client(config)?.load(url, global.refresh).await {
        Ok(journals) => journals,
        Err(e) => {
            warn!(url, error = %e, "could not load journal abbreviations");
            JournalAbbreviations::new()
        }
    };
    journals.extend(config.clean.custom.clone());

    let mut custom = BTreeMap::new();
    for spec in &global.custom {
        match JournalAbbreviations::parse_custom(spec) {
            Some((full, abbrev)) => {
                journals.insert(full.clone(), abbrev.clone());
                custom.insert(full, abbrev);
            }
            None => warn!(custom = %spec, "expected 'Full Name;Abbrev.'"),
        }
    }
    Ok((journals, custom))
}

/// Look up pages for articles that have a DOI but no pages. Returns how many
/// were filled in.
async fn fill_missing_pages(library: &mut Library, client: &DoiOrgClient) -> usize {
    let missing = library
        .entries()
        .iter()
        .filter(|entry| entry.is_article() && entry.non_empty("pages").is_none())
        .filter_map(|entry| Some((entry.key.clone(), Doi::parse(entry.non_empty("doi")?).ok()?)))
        .collect::<Vec<_>>();

    let mut filled = 0;
    for (key, doi) in missing {
        let Some(pages) = client.find_pages(&doi).await else {
            continue;
        };
        let Some(mut entry) = library.get(&key).cloned() else {
            continue;
        };
        entry.set("pages", &pages);
        if library.replace(entry).is_ok() {
            filled += 1;
        }
    }
    filled
}

fn cache(config: &AppConfig, namespace: &str) -> Option<DiskCache> {
    let days = config.fetch.cache_ttl_days;
    (days > 0).then(|| DiskCache::new(namespace, Duration::from_secs(days * 24 * 60 * 60)))
}

fn doi_org_client(config: &AppConfig, failures: Arc<FailureLog>) -> Result<DoiOrgClient> {
    let throttle = Arc::new(Throttle::per_second(config.fetch.doi_requests_per_second));
    let ua = user_agent(config.fetch.polite_email.as_deref());
    let client = DoiOrgClient::new(throttle, config.fetch.max_retries, &ua, failures)?;
    Ok(match cache(config, "doi") {
        Some(cache) => client.with_cache(cache),
        None => client,
    })
}

fn journal_list_client(config: &AppConfig) -> Result<JournalListClient> {
    let throttle = Arc::new(Throttle::unlimited());
    let ua = user_agent(config.fetch.polite_email.as_deref());
    let client = JournalListClient::new(throttle, config.fetch.max_retries, &ua)?;
    Ok(match cache(config, "journals") {
        Some(cache) => client.with_cache(cache),
        None => client,
    })
}

pub(crate) fn openalex_client(config: &AppConfig, failures: Arc<FailureLog>) -> Result<OpenAlexClient> {
    let throttle = Arc::new(Throttle::per_second(config.fetch.openalex_requests_per_second));
    let ua = user_agent(config.fetch.polite_email.as_deref());
    let client = OpenAlexClient::new(throttle, config.fetch.max_retries, &ua, failures)?;
    Ok(match cache(config, "openalex") {
        Some(cache) => client.with_cache(cache),
        None => client,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LogLevel;
    use doi2bib_core::bibtex::parse_str;
    use tempfile::TempDir;

    fn global(dois: &[&str], doifile: Option<PathBuf>) -> GlobalOpts {
        GlobalOpts {
            dois: dois.iter().map(|s| s.to_string()).collect(),
            doifile,
            bibtexdb: None,
            loglevel: LogLevel::Warning,
            cited: false,
            citing: false,
            llm_model: None,
            refresh: false,
            database: None,
            custom: Vec::new(),
        }
    }

    #[test]
    fn collects_dois_from_every_source_once() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("refs.txt");
        std::fs::write(&file, "see 10.1000/B1 and 10.1000/c1.").unwrap();

        let dois = collect_dois(
            &global(&["10.1000/a1", " 10.1000/b1", "", "not a doi"], Some(file)),
            &["10.1000/A1".to_string()],
        )
        .unwrap();
        let found = dois.iter().map(Doi::as_str).collect::<Vec<_>>();
        assert_eq!(found, vec!["10.1000/a1", "10.1000/b1", "10.1000/c1"]);
    }

    #[test]
    fn skips_dois_already_in_library() {
        let library = parse_str(
            "@article{k, doi = {10.1/ABC}}\n@article{j, doi = {https://doi.org/10.1/old}}",
        );
        let dois = ["10.1/abc", "10.1/OLD", "10.1/new"]
            .iter()
            .map(|s| Doi::parse(s).unwrap())
            .collect();
        let left = new_dois(&library, dois);
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].as_str(), "10.1/new");
    }

    #[tokio::test]
    async fn custom_abbreviations_join_the_downloaded_list() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/acs.csv")
            .with_status(200)
            .with_body("Nano Letters,Nano Lett.\n")
            .create_async()
            .await;

        let mut config = AppConfig::default();
        config.fetch.cache_ttl_days = 0;
        config.clean.custom.insert("Cat Reviews".to_string(), "Cat Rev.".to_string());
        let mut opts = global(&[], None);
        opts.database = Some(format!("{}/acs.csv", server.url()));
        opts.custom = vec!["Journal of Kittens;J. Kitt.".to_string(), "broken".to_string()];

        let (journals, custom) = load_journals(&config, &opts).await.unwrap();
        assert_eq!(journals.len(), 3);
        assert!(journals.is_abbreviation("Cat Rev."));
        assert!(journals.is_abbreviation("J. Kitt."));
        assert_eq!(custom.len(), 1);
        assert_eq!(custom.get("Journal of Kittens").map(String::as_str), Some("J. Kitt."));
    }

    #[tokio::test]
    async fn missing_pages_are_looked_up_for_articles_with_dois() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/10.1/y")
            .with_status(200)
            .with_body(r#"{"page": "7-9"}"#)
            .create_async()
            .await;

        let mut library = parse_str(
            "@article{y, doi = {10.1/y}}\n@article{kept, doi = {10.1/z}, pages = {1}}\n@book{b, doi = {10.1/y}}",
        );
        let client = DoiOrgClient::new(Arc::new(Throttle::unlimited()), 0, "doi2bib-test", Arc::new(FailureLog::new()))
            .unwrap()
            .with_base_url(server.url());

        assert_eq!(fill_missing_pages(&mut library, &client).await, 1);
        assert_eq!(library.get("y").unwrap().value("pages"), Some("7-9"));
        assert_eq!(library.get("kept").unwrap().value("pages"), Some("1"));
        assert!(library.get("b").unwrap().value("pages").is_none());
    }
}
