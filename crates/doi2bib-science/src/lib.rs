//! doi2bib science: DOI resolution, citation graphs, entry cleaning,
//! duplicate detection and LaTeX citation rewriting.

pub mod clean;
pub mod dedup;
pub mod error;
pub mod http;
pub mod identifiers;
pub mod sources;
pub mod tex;

pub use clean::{
    AbbreviationAuthority, AbbreviationChoice, CleanFailure, CleanOutcome, JournalAbbreviations,
    clean_library,
};
pub use dedup::{
    Authority, Candidate, DedupeOutcome, DedupePlan, Decision, DuplicateGroup, KeyMap, LlmOracle,
    SimilarityOracle, dedupe_library,
};
pub use error::{Result, ScienceError};
pub use http::{DiskCache, RateLimitedClient, Throttle};
pub use identifiers::{Doi, extract_dois_from_text, read_dois_from_file};
pub use sources::{
    DoiOrgClient, FailureLog, FailureRecord, JournalListClient, OpenAlexClient, OpenAlexWork,
};
pub use tex::{TexCheckOutcome, check_tex_cites};
