use std::fmt;
use std::str::FromStr;

use crate::error::{Result, ScienceError};

/// Resolver prefixes stripped before validation. Matched after case folding.
const RESOLVER_PREFIXES: &[&str] = &[
    "https://doi.org/",
    "http://doi.org/",
    "https://dx.doi.org/",
    "http://dx.doi.org/",
    "doi:",
];

/// A case-folded DOI such as `10.1038/nphys1170`.
///
/// Two spellings of the same DOI (`DOI: 10.1038/NPHYS1170`,
/// `https://doi.org/10.1038%2Fnphys1170`) parse to equal values, so a `Doi`
/// can be used directly as a set key when checking what a library already
/// holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Doi(String);

impl Doi {
    pub fn parse(input: &str) -> Result<Self> {
        let folded = input.trim().replace("%2F", "/").replace("%2f", "/").to_lowercase();
        let bare = RESOLVER_PREFIXES
            .iter()
            .find_map(|prefix| folded.strip_prefix(prefix))
            .unwrap_or(&folded)
            .trim();

        match bare.split_once('/') {
            Some((registrant, suffix)) if is_registrant(registrant) && !suffix.is_empty() => {
                Ok(Self(bare.to_string()))
            }
            _ => Err(ScienceError::InvalidDoi(input.trim().to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// `10.` followed by dot-separated digits, e.g. `10.1038` or `10.1000.10`.
fn is_registrant(registrant: &str) -> bool {
    registrant.strip_prefix("10.").is_some_and(|rest| {
        !rest.is_empty() && rest.split('.').all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()))
    })
}

impl FromStr for Doi {
    type Err = ScienceError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Doi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
