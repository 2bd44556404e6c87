//! Append-only FAQ record store (`faq_metadata.json`).
//!
//! Unlike the ledgers, an unreadable store is an error rather than an empty
//! start: silently replacing it on the next append would throw away every
//! accepted record.

use std::path::PathBuf;

use anyhow::anyhow;

use crate::error::PipelineError;
use crate::models::FaqRecord;
use crate::persist;

#[derive(Debug)]
pub struct FaqStore {
    path: PathBuf,
    records: Vec<FaqRecord>,
}

impl FaqStore {
    /// Load the store at `path`; a missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let path = path.into();
        let records = persist::read_json::<Vec<FaqRecord>>(&path)
            .map_err(|e| PipelineError::Persistence(anyhow!("FAQ store: {e:#}")))?
            .unwrap_or_default();
        Ok(Self { path, records })
    }

    /// Append a record and persist the whole collection.
    pub fn append(&mut self, record: FaqRecord) -> Result<(), PipelineError> {
        self.records.push(record);
        if let Err(e) = persist::write_json_atomic(&self.path, &self.records) {
            self.records.pop();
            return Err(PipelineError::Persistence(e));
        }
        Ok(())
    }

    pub fn contains_source(&self, source_email_id: &str) -> bool {
        self.records
            .iter()
            .any(|r| r.source_email_id == source_email_id)
    }

    pub fn records(&self) -> &[FaqRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
