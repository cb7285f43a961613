pub mod doi_org;
pub mod failures;
pub mod journal_list;
pub mod openalex;

pub use doi_org::DoiOrgClient;
pub use failures::{FailureLog, FailureRecord};
pub use journal_list::JournalListClient;
pub use openalex::{OpenAlexClient, OpenAlexWork};

/// User agent sent to doi.org and OpenAlex; includes a contact address
/// when one is configured (OpenAlex "polite pool").
pub fn user_agent(polite_email: Option<&str>) -> String {
    let base = concat!("doi2bib/", env!("CARGO_PKG_VERSION"));
    match polite_email {
        Some(email) => format!("{base} (mailto:{email})"),
        None => base.to_string(),
    }
}
