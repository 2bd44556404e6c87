//! State overview and FAQ listing.
//!
//! `faqh status` reads the FAQ store and both ledgers and prints their
//! counts, giving confidence that extraction and vectorization are keeping
//! up. `faqh faqs` prints the stored records themselves.

use anyhow::Result;

use crate::config::Config;
use crate::ledger::IdLedger;
use crate::models::FaqRecord;
use crate::store::FaqStore;

/// Snapshot of the persisted pipeline state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateCounts {
    pub faq_records: usize,
    pub processed_ids: usize,
    pub vectorized_ids: usize,
    /// Stored records whose source email id is not yet vectorized.
    pub pending_vectorization: usize,
}

pub fn collect_counts(config: &Config) -> Result<StateCounts> {
    let store = FaqStore::open(config.data.faq_store_path())?;
    let processed = IdLedger::open(config.data.processed_ledger_path());
    let vectorized = IdLedger::open(config.data.vectorized_ledger_path());

    let pending = crate::vectorize::pending_records(&store, &vectorized).len();

    Ok(StateCounts {
        faq_records: store.len(),
        processed_ids: processed.len(),
        vectorized_ids: vectorized.len(),
        pending_vectorization: pending,
    })
}

/// Run the status command: load persisted state and print a summary.
pub fn run_status(config: &Config) -> Result<()> {
    let counts = collect_counts(config)?;

    println!("FAQ Harvester — State");
    println!("=====================");
    println!();
    println!("  Data dir:      {}", config.data.dir.display());
    println!("  FAQ records:   {}", counts.faq_records);
    println!("  Processed ids: {}", counts.processed_ids);
    println!(
        "  Vectorized:    {} ({} pending)",
        counts.vectorized_ids, counts.pending_vectorization
    );
    println!();
    Ok(())
}

/// Print stored FAQ records, newest first, at most `limit` of them.
pub fn run_list_faqs(config: &Config, limit: Option<usize>) -> Result<()> {
    let store = FaqStore::open(config.data.faq_store_path())?;
    let records = newest_first(store.records(), limit);

    if records.is_empty() {
        println!("No FAQ records.");
        return Ok(());
    }

    for record in records {
        println!(
            "{}  {}",
            record.timestamp.format("%Y-%m-%d"),
            if record.topic.is_empty() {
                "(no topic)"
            } else {
                &record.topic
            }
        );
        println!("    Q: {}", one_line(&record.question));
        println!("    A: {}", one_line(&record.answer));
        if !record.keywords.is_empty() {
            println!("    keywords: {}", record.keywords.join(", "));
        }
        println!("    id: {}", record.source_email_id);
        println!();
    }
    Ok(())
}

fn newest_first(records: &[FaqRecord], limit: Option<usize>) -> Vec<&FaqRecord> {
    let mut sorted: Vec<&FaqRecord> = records.iter().collect();
    sorted.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    if let Some(limit) = limit {
        sorted.truncate(limit);
    }
    sorted
}

fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(id: &str, day: u32) -> FaqRecord {
        FaqRecord {
            question: "How do I reset?".to_string(),
            answer: "Use the portal.".to_string(),
            topic: "Accounts".to_string(),
            keywords: vec!["reset".to_string()],
            source_email_id: id.to_string(),
            conversation_id: "c".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, day, 9, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_newest_first_with_limit() {
        let records = vec![record("a", 1), record("c", 3), record("b", 2)];
        let listed = newest_first(&records, Some(2));
        let ids: Vec<&str> = listed.iter().map(|r| r.source_email_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b"]);
        assert_eq!(newest_first(&records, None).len(), 3);
    }

    #[test]
    fn test_one_line() {
        assert_eq!(one_line("a\n b\t\tc "), "a b c");
    }
}
