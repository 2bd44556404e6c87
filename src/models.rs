//! Core data models used throughout the harvester.
//!
//! These types represent the messages, candidate pairs, and accepted FAQ
//! records that flow through the extraction and vectorization pipelines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single mail message, validated at the ingestion boundary.
///
/// See [`crate::mail::parse_graph_message`] for how raw provider JSON is
/// turned into a `Message`.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub conversation_id: Option<String>,
    pub sender_address: String,
    pub subject: Option<String>,
    pub received_at: DateTime<Utc>,
    pub raw_body: String,
}

/// A question/answer pair proposed by the extractor, not yet validated.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidatePair {
    pub question: String,
    pub answer: String,
    /// Id of the agent's reply. Identity key for the rest of the pipeline.
    pub answer_id: String,
    pub subject: String,
    pub timestamp: DateTime<Utc>,
}

/// Normalized metadata returned by a validator for an accepted pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaqMetadata {
    pub topic: String,
    pub keywords: Vec<String>,
}

/// An accepted FAQ entry, persisted in the FAQ store.
///
/// `question` and `answer` are the cleaned source text, never rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaqRecord {
    pub question: String,
    pub answer: String,
    pub topic: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub source_email_id: String,
    pub conversation_id: String,
    pub timestamp: DateTime<Utc>,
}

impl FaqRecord {
    pub fn from_pair(pair: &CandidatePair, conversation_id: &str, meta: FaqMetadata) -> Self {
        Self {
            question: pair.question.clone(),
            answer: pair.answer.clone(),
            topic: meta.topic,
            keywords: meta.keywords,
            source_email_id: pair.answer_id.clone(),
            conversation_id: conversation_id.to_string(),
            timestamp: pair.timestamp,
        }
    }

    /// Text handed to the embedder for this record.
    pub fn embedding_text(&self) -> String {
        format!("Question: {}\nAnswer: {}", self.question, self.answer)
    }
}
