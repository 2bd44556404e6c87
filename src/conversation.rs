//! Conversation reconstruction and question/answer pair detection.
//!
//! Mail sources return a flat, unordered window of messages.
//! [`group_by_conversation`] rebuilds the conversations and
//! [`extract_pair`] finds the most recent genuine support exchange in one
//! of them: an agent reply directly preceded by a message from someone else.
//!
//! Only one pair per conversation is extracted. Older exchanges in the same
//! thread are never revisited.

use std::collections::BTreeMap;

use crate::models::{CandidatePair, Message};
use crate::sanitize::clean_html;

/// Cleaned bodies shorter than this (in characters) are not worth validating.
pub const MIN_BODY_CHARS: usize = 10;

/// Partition messages by conversation id.
///
/// Messages without a conversation id are dropped. Within a conversation,
/// messages keep their input order; [`extract_pair`] re-sorts them.
pub fn group_by_conversation(messages: Vec<Message>) -> BTreeMap<String, Vec<Message>> {
    let mut threads: BTreeMap<String, Vec<Message>> = BTreeMap::new();
    for message in messages {
        let Some(cid) = message.conversation_id.clone() else {
            continue;
        };
        if cid.is_empty() {
            continue;
        }
        threads.entry(cid).or_default().push(message);
    }
    threads
}

fn same_address(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Find the most recent qualifying question/answer pair in a conversation.
///
/// Messages are ordered newest first (stable on ties) and scanned as
/// adjacent `(newer, older)` pairs. A pair qualifies when the newer message
/// was sent by `agent_address`, the older was not, and both cleaned bodies
/// are at least [`MIN_BODY_CHARS`] long. The first qualifying pair wins.
///
/// Returns `None` when nothing qualifies, which is not an error.
pub fn extract_pair(messages: &[Message], agent_address: &str) -> Option<CandidatePair> {
    if messages.len() < 2 {
        return None;
    }

    let mut sorted: Vec<&Message> = messages.iter().collect();
    sorted.sort_by(|a, b| b.received_at.cmp(&a.received_at));

    for window in sorted.windows(2) {
        let (answer, question) = (window[0], window[1]);

        if !same_address(&answer.sender_address, agent_address) {
            continue;
        }
        if same_address(&question.sender_address, agent_address) {
            continue;
        }

        let answer_text = clean_html(&answer.raw_body);
        let question_text = clean_html(&question.raw_body);
        if answer_text.chars().count() < MIN_BODY_CHARS
            || question_text.chars().count() < MIN_BODY_CHARS
        {
            continue;
        }

        return Some(CandidatePair {
            question: question_text,
            answer: answer_text,
            answer_id: answer.id.clone(),
            subject: answer.subject.clone().unwrap_or_default(),
            timestamp: answer.received_at,
        });
    }

    None
}
