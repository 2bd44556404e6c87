//! Extraction loop orchestration.
//!
//! One tick runs the full flow:
//!
//! ```text
//! fetch → group → extract pair → ledger gate → validate → store + ledger
//! ```
//!
//! The [`Extractor`] owns the processed ledger and the FAQ store, so only
//! the single running tick ever touches them. Every answer id is sent to
//! the validator at most once under the default fault policy: accepted and
//! rejected ids are both recorded in the ledger. Records are appended
//! before their id is marked, so a crash in between leaves a stored record
//! with an unmarked id; the next tick notices and marks it without calling
//! the validator again.

use std::future::Future;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::{Config, FaultPolicy};
use crate::conversation::{extract_pair, group_by_conversation};
use crate::error::PipelineError;
use crate::ledger::IdLedger;
use crate::mail::MailSource;
use crate::models::FaqRecord;
use crate::store::FaqStore;
use crate::validator::{create_validator, ValidationGateway, Verdict};

/// Per-tick counters, printed after every run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub fetched: usize,
    pub conversations: usize,
    pub candidates: usize,
    /// Candidates whose answer id was already in the ledger.
    pub skipped: usize,
    /// Stored records whose id was missing from the ledger, now marked.
    pub recovered: usize,
    pub accepted: usize,
    pub rejected: usize,
    /// Validator calls that faulted (also counted under `rejected` when
    /// the fault policy is `mark`).
    pub faulted: usize,
}

impl TickSummary {
    pub fn print(&self) {
        println!("extract");
        println!("  fetched: {} messages", self.fetched);
        println!("  conversations: {}", self.conversations);
        println!("  candidates: {}", self.candidates);
        println!("  skipped (already processed): {}", self.skipped);
        if self.recovered > 0 {
            println!("  recovered: {}", self.recovered);
        }
        println!("  accepted: {}", self.accepted);
        println!("  rejected: {}", self.rejected);
        println!("  faulted: {}", self.faulted);
        println!("ok");
    }
}

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Size of the recent-message window fetched per tick.
    pub max_messages: usize,
    pub on_fault: FaultPolicy,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            max_messages: 50,
            on_fault: FaultPolicy::Mark,
        }
    }
}

pub struct Extractor {
    mail: Box<dyn MailSource>,
    validator: Box<dyn ValidationGateway>,
    ledger: IdLedger,
    store: FaqStore,
    options: ExtractOptions,
}

impl Extractor {
    pub fn new(
        mail: Box<dyn MailSource>,
        validator: Box<dyn ValidationGateway>,
        ledger: IdLedger,
        store: FaqStore,
        options: ExtractOptions,
    ) -> Self {
        Self {
            mail,
            validator,
            ledger,
            store,
            options,
        }
    }

    /// Build an extractor from configuration: connect the mail source,
    /// create the validator and open the processed ledger and FAQ store.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Initialization`] for missing credentials or a failed
    /// identity lookup, [`PipelineError::Persistence`] for an unreadable
    /// FAQ store.
    pub async fn from_config(config: &Config) -> Result<Self, PipelineError> {
        let mail = crate::mail::create_source(&config.mail).await?;
        let validator =
            create_validator(&config.validator).map_err(PipelineError::Initialization)?;
        let ledger = IdLedger::open(config.data.processed_ledger_path());
        let store = FaqStore::open(config.data.faq_store_path())?;
        info!(
            agent = %mail.agent_address(),
            processed = ledger.len(),
            records = store.len(),
            "extractor ready"
        );
        Ok(Self::new(
            mail,
            validator,
            ledger,
            store,
            ExtractOptions {
                max_messages: config.mail.max_messages,
                on_fault: config.validator.on_fault,
            },
        ))
    }

    pub fn ledger(&self) -> &IdLedger {
        &self.ledger
    }

    pub fn store(&self) -> &FaqStore {
        &self.store
    }

    /// Run one extraction tick to completion.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::Fetch`] if the mail source fails (nothing changed).
    /// - [`PipelineError::Persistence`] if a ledger or store write fails;
    ///   the tick stops at that conversation.
    pub async fn run_tick(&mut self) -> Result<TickSummary, PipelineError> {
        let agent = self.mail.agent_address().to_string();
        let mut summary = TickSummary::default();

        let messages = self
            .mail
            .fetch_recent(self.options.max_messages)
            .await
            .map_err(PipelineError::Fetch)?;
        summary.fetched = messages.len();

        let threads = group_by_conversation(messages);
        summary.conversations = threads.len();
        info!(
            fetched = summary.fetched,
            conversations = summary.conversations,
            agent = %agent,
            "mail fetched"
        );

        for (conversation_id, thread) in &threads {
            let Some(pair) = extract_pair(thread, &agent) else {
                debug!(conversation = %conversation_id, "no qualifying pair");
                continue;
            };
            summary.candidates += 1;

            if self.ledger.is_processed(&pair.answer_id) {
                debug!(answer_id = %pair.answer_id, "already processed, skipping");
                summary.skipped += 1;
                continue;
            }

            if self.store.contains_source(&pair.answer_id) {
                warn!(
                    answer_id = %pair.answer_id,
                    "record stored but not marked processed, marking"
                );
                self.ledger.mark_processed(&pair.answer_id)?;
                summary.recovered += 1;
                continue;
            }

            info!(answer_id = %pair.answer_id, subject = %pair.subject, "validating candidate");
            match self.validator.validate(&pair.question, &pair.answer).await {
                Ok(Verdict::Accepted(meta)) => {
                    info!(answer_id = %pair.answer_id, topic = %meta.topic, "accepted");
                    let record = FaqRecord::from_pair(&pair, conversation_id, meta);
                    self.store.append(record)?;
                    self.ledger.mark_processed(&pair.answer_id)?;
                    summary.accepted += 1;
                }
                Ok(Verdict::Rejected) => {
                    info!(answer_id = %pair.answer_id, "rejected");
                    self.ledger.mark_processed(&pair.answer_id)?;
                    summary.rejected += 1;
                }
                Err(e) => {
                    summary.faulted += 1;
                    match self.options.on_fault {
                        FaultPolicy::Mark => {
                            warn!(
                                answer_id = %pair.answer_id,
                                error = %format!("{e:#}"),
                                "validator fault, recording as rejected"
                            );
                            self.ledger.mark_processed(&pair.answer_id)?;
                            summary.rejected += 1;
                        }
                        FaultPolicy::Retry => {
                            warn!(
                                answer_id = %pair.answer_id,
                                error = %format!("{e:#}"),
                                "validator fault, will retry next tick"
                            );
                        }
                    }
                }
            }
        }

        info!(
            accepted = summary.accepted,
            rejected = summary.rejected,
            skipped = summary.skipped,
            faulted = summary.faulted,
            "tick complete"
        );
        Ok(summary)
    }

    /// Run a tick immediately, then one every `interval`, until Ctrl-C.
    pub async fn run_scheduled(&mut self, interval: Duration) {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "cannot listen for Ctrl-C, running until killed");
                std::future::pending::<()>().await;
            }
        };
        self.run_until(interval, ctrl_c).await;
    }

    /// Tick every `interval` until `shutdown` resolves. Returns the number of
    /// ticks run.
    ///
    /// Ticks never overlap: each is awaited to completion and ticks missed
    /// while one was running are skipped. A failing tick is logged and the
    /// loop carries on. `shutdown` is created once and polled before every
    /// tick, so a signal that arrives mid-tick stops the loop as soon as that
    /// tick finishes.
    pub async fn run_until<F>(&mut self, interval: Duration, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!(interval_secs = interval.as_secs(), "scheduler started");
        let mut ticks = 0;
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!(ticks, "shutdown requested");
                    break;
                }
                _ = ticker.tick() => {}
            }

            ticks += 1;
            match self.run_tick().await {
                Ok(summary) => summary.print(),
                Err(e) => error!(kind = e.kind(), error = %e, "tick aborted"),
            }
        }
        ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_mark_faults() {
        let options = ExtractOptions::default();
        assert_eq!(options.max_messages, 50);
        assert_eq!(options.on_fault, FaultPolicy::Mark);
    }

    #[test]
    fn test_summary_starts_at_zero() {
        let summary = TickSummary::default();
        assert_eq!(summary.accepted + summary.rejected + summary.skipped, 0);
    }
}
