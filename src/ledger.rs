//! Durable, grow-only identifier sets.
//!
//! Two ledgers gate the pipelines:
//!
//! | Ledger | File | Question it answers |
//! |--------|------|---------------------|
//! | processed | `processed_state.json` | has this answer email been evaluated by the validator? |
//! | vectorized | `vectorized_state.json` | has this FAQ record been embedded and upserted? |
//!
//! Both are [`IdLedger`]s. The whole set is loaded on open and the whole
//! set is written back (atomically) after every mutation that adds an id.
//! There is no removal. A corrupt file degrades to an empty ledger: items
//! get re-evaluated, which costs gateway calls but never crashes the
//! process.

use std::collections::BTreeSet;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::persist;

/// A persisted, monotonically growing set of identifiers.
#[derive(Debug)]
pub struct IdLedger {
    path: PathBuf,
    ids: BTreeSet<String>,
}

impl IdLedger {
    /// Load the ledger at `path`. Missing file → empty ledger (created on
    /// first write). Unreadable or corrupt file → empty ledger, with a warning.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let ids = match persist::read_json::<Vec<String>>(&path) {
            Ok(Some(ids)) => ids.into_iter().collect(),
            Ok(None) => BTreeSet::new(),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %format!("{e:#}"),
                    "ledger unreadable, starting empty"
                );
                BTreeSet::new()
            }
        };
        debug!(path = %path.display(), count = ids.len(), "ledger loaded");
        Self { path, ids }
    }

    pub fn is_processed(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Add `id` and persist the full set before returning.
    ///
    /// Marking an id that is already present is a no-op (no write). If the
    /// write fails the id is removed again so memory never runs ahead of disk.
    pub fn mark_processed(&mut self, id: &str) -> Result<(), PipelineError> {
        if !self.ids.insert(id.to_string()) {
            return Ok(());
        }
        if let Err(e) = self.save() {
            self.ids.remove(id);
            return Err(e);
        }
        Ok(())
    }

    /// Add every id in `ids` with a single write. Returns how many were new.
    pub fn mark_many<I, S>(&mut self, ids: I) -> Result<usize, PipelineError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut added = Vec::new();
        for id in ids {
            let id = id.as_ref();
            if self.ids.insert(id.to_string()) {
                added.push(id.to_string());
            }
        }
        if added.is_empty() {
            return Ok(0);
        }
        if let Err(e) = self.save() {
            for id in &added {
                self.ids.remove(id);
            }
            return Err(e);
        }
        Ok(added.len())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    fn save(&self) -> Result<(), PipelineError> {
        persist::write_json_atomic(&self.path, &self.ids).map_err(PipelineError::Persistence)
    }
}
