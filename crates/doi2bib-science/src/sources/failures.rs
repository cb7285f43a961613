use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::error;

/// A permanent fetch failure, kept for the end-of-run summary.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureRecord {
    pub url: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Thread-safe list of permanent failures shared by the metadata clients.
#[derive(Debug, Default)]
pub struct FailureLog {
    records: Mutex<Vec<FailureRecord>>,
}

impl FailureLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, url: impl Into<String>, message: impl Into<String>) {
        let record = FailureRecord {
            url: url.into(),
            message: message.into(),
            at: Utc::now(),
        };
        error!(url = %record.url, message = %record.message, "fetch failed");
        match self.records.lock() {
            Ok(mut records) => records.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
    }

    pub fn entries(&self) -> Vec<FailureRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_keep_insertion_order() {
        let log = FailureLog::new();
        assert!(log.is_empty());
        log.record("https://doi.org/10.1/a", "not found");
        log.record("https://api.openalex.org/works/x", "HTTP 500");
        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "not found");
        assert!(entries[0].at <= entries[1].at);
    }
}
