//! Candidate-pair validation.
//!
//! A [`ValidationGateway`] decides whether a candidate pair is a genuine,
//! reusable FAQ entry and, if so, returns a short topic and a handful of
//! keywords. The question and answer text are passed exactly as cleaned and
//! must come back unaltered; a response that rewrites them is treated as
//! non-conforming and rejected.
//!
//! `validate` returns `Err` for gateway faults (transport errors,
//! timeouts, unparseable output). What happens to a faulted pair is decided
//! by the caller's [`FaultPolicy`](crate::config::FaultPolicy), not here.
//!
//! The production implementation is [`GeminiValidator`].

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::config::ValidatorConfig;
use crate::models::FaqMetadata;

/// Environment variable holding the Gemini API key.
pub const GEMINI_KEY_ENV: &str = "GEMINI_API_KEY";

pub const MIN_KEYWORDS: usize = 3;
pub const MAX_KEYWORDS: usize = 5;

/// Outcome of a successful validation call.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accepted(FaqMetadata),
    Rejected,
}

#[async_trait]
pub trait ValidationGateway: Send + Sync {
    /// Classify a pair. `Err` means the call itself faulted.
    async fn validate(&self, question: &str, answer: &str) -> Result<Verdict>;
}

pub fn create_validator(config: &ValidatorConfig) -> Result<Box<dyn ValidationGateway>> {
    match config.provider.as_str() {
        "gemini" => Ok(Box::new(GeminiValidator::new(config)?)),
        other => bail!("Unknown validator provider: {}", other),
    }
}

/// Raw JSON shape requested from the model.
#[derive(Debug, Deserialize)]
struct ModelAnswer {
    #[serde(default)]
    valid: bool,
    #[serde(default)]
    question: Option<String>,
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    topic: Option<String>,
    #[serde(default)]
    keywords: Vec<String>,
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an optional language tag on the opening fence line.
    let rest = match rest.find('\n') {
        Some(idx) if !rest[..idx].contains('{') => &rest[idx + 1..],
        _ => rest,
    };
    rest.trim_end().trim_end_matches("```").trim()
}

/// Interpret a model's text response for the pair `(question, answer)`.
///
/// Unparseable JSON is a fault (`Err`). Everything else maps to a
/// [`Verdict`]: `valid` must be `true`, the echoed question and answer must
/// equal the input, the topic must be non-empty and at least
/// [`MIN_KEYWORDS`] distinct keywords must be present (extra ones beyond
/// [`MAX_KEYWORDS`] are dropped).
pub fn parse_verdict(response_text: &str, question: &str, answer: &str) -> Result<Verdict> {
    let body = strip_code_fence(response_text);
    let parsed: ModelAnswer =
        serde_json::from_str(body).context("validator returned malformed JSON")?;

    if !parsed.valid {
        return Ok(Verdict::Rejected);
    }

    let echoed_q = parsed.question.as_deref().map(str::trim);
    let echoed_a = parsed.answer.as_deref().map(str::trim);
    if echoed_q != Some(question.trim()) || echoed_a != Some(answer.trim()) {
        tracing::warn!("validator altered the pair text, rejecting");
        return Ok(Verdict::Rejected);
    }

    let topic = parsed.topic.unwrap_or_default().trim().to_string();
    if topic.is_empty() {
        return Ok(Verdict::Rejected);
    }

    let mut keywords: Vec<String> = Vec::new();
    for kw in parsed.keywords {
        let kw = kw.trim();
        if !kw.is_empty() && !keywords.iter().any(|k| k.eq_ignore_ascii_case(kw)) {
            keywords.push(kw.to_string());
        }
    }
    if keywords.len() < MIN_KEYWORDS {
        return Ok(Verdict::Rejected);
    }
    keywords.truncate(MAX_KEYWORDS);

    Ok(Verdict::Accepted(FaqMetadata { topic, keywords }))
}

fn build_prompt(question: &str, answer: &str) -> String {
    format!(
        r#"Analyze the following email exchange between a User and a Support Agent.

USER QUESTION:
{question}

--------------------------------------------------

SUPPORT ANSWER:
{answer}

--------------------------------------------------

TASK:
1. Is this a valid, helpful Question & Answer pair suitable for an FAQ? (Ignore generic replies like "Thanks", "Ok", "Will check").
2. If YES: Return a JSON object with:
   - "valid": true
   - "question": (The exact question text)
   - "answer": (The exact answer text)
   - "topic": (A short 1-2 word category)
   - "keywords": (List of 3-5 keywords)
3. If NO: Return JSON with "valid": false.

IMPORTANT:
- Do NOT rewrite or summarize. Use the original text.
- Output ONLY raw JSON. No markdown ticks.
"#
    )
}

// ============ Gemini ============

/// Validator calling the Gemini `generateContent` endpoint.
///
/// Requires the `GEMINI_API_KEY` environment variable. Every request
/// carries the configured timeout and is never retried.
pub struct GeminiValidator {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl GeminiValidator {
    pub fn new(config: &ValidatorConfig) -> Result<Self> {
        let api_key = std::env::var(GEMINI_KEY_ENV)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", GEMINI_KEY_ENV))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let endpoint = format!(
            "{}/models/{}:generateContent",
            config.base_url.trim_end_matches('/'),
            config.model
        );
        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }
}

/// Pull the first candidate's text out of a `generateContent` response.
fn response_text(json: &serde_json::Value) -> Result<String> {
    let parts = json
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Gemini response: missing candidates"))?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    if text.trim().is_empty() {
        bail!("Invalid Gemini response: empty text");
    }
    Ok(text)
}

#[async_trait]
impl ValidationGateway for GeminiValidator {
    async fn validate(&self, question: &str, answer: &str) -> Result<Verdict> {
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": build_prompt(question, answer) }] }],
            "generationConfig": { "responseMimeType": "application/json" }
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .context("Gemini request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Gemini API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        let text = response_text(&json)?;
        parse_verdict(&text, question, answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const Q: &str = "How do I reset my password?";
    const A: &str = "Go to Settings > Reset.";

    fn accepted_json() -> String {
        serde_json::json!({
            "valid": true,
            "question": Q,
            "answer": A,
            "topic": "Account",
            "keywords": ["password", "reset", "settings"]
        })
        .to_string()
    }

    #[test]
    fn test_accepts_conforming_response() {
        let verdict = parse_verdict(&accepted_json(), Q, A).unwrap();
        assert_eq!(
            verdict,
            Verdict::Accepted(FaqMetadata {
                topic: "Account".to_string(),
                keywords: vec!["password".into(), "reset".into(), "settings".into()],
            })
        );
    }

    #[test]
    fn test_code_fences_stripped() {
        let fenced = format!("```json\n{}\n```", accepted_json());
        assert!(matches!(parse_verdict(&fenced, Q, A).unwrap(), Verdict::Accepted(_)));
        let bare = format!("```{}```", accepted_json());
        assert!(matches!(parse_verdict(&bare, Q, A).unwrap(), Verdict::Accepted(_)));
    }

    #[test]
    fn test_explicit_rejection() {
        let verdict = parse_verdict(r#"{"valid": false}"#, Q, A).unwrap();
        assert_eq!(verdict, Verdict::Rejected);
    }

    #[test]
    fn test_rewritten_text_rejected() {
        let json = serde_json::json!({
            "valid": true,
            "question": "How can I reset my password?",
            "answer": A,
            "topic": "Account",
            "keywords": ["password", "reset", "settings"]
        });
        assert_eq!(parse_verdict(&json.to_string(), Q, A).unwrap(), Verdict::Rejected);
    }

    #[test]
    fn test_keyword_bounds() {
        let few = serde_json::json!({
            "valid": true, "question": Q, "answer": A, "topic": "Account",
            "keywords": ["password", "Password", " "]
        });
        assert_eq!(parse_verdict(&few.to_string(), Q, A).unwrap(), Verdict::Rejected);

        let many = serde_json::json!({
            "valid": true, "question": Q, "answer": A, "topic": "Account",
            "keywords": ["a", "b", "c", "d", "e", "f", "g"]
        });
        match parse_verdict(&many.to_string(), Q, A).unwrap() {
            Verdict::Accepted(meta) => assert_eq!(meta.keywords.len(), MAX_KEYWORDS),
            other => panic!("expected acceptance, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_topic_rejected() {
        let json = serde_json::json!({
            "valid": true, "question": Q, "answer": A,
            "keywords": ["password", "reset", "settings"]
        });
        assert_eq!(parse_verdict(&json.to_string(), Q, A).unwrap(), Verdict::Rejected);
    }

    #[test]
    fn test_malformed_json_is_fault() {
        assert!(parse_verdict("Sure! Here is the JSON: {", Q, A).is_err());
        assert!(parse_verdict("", Q, A).is_err());
    }

    #[test]
    fn test_response_text_extraction() {
        let json = serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": "{\"valid\":" }, { "text": " false}" }] } }]
        });
        assert_eq!(response_text(&json).unwrap(), "{\"valid\": false}");
        assert!(response_text(&serde_json::json!({ "candidates": [] })).is_err());
    }

    #[test]
    fn test_prompt_carries_text_verbatim() {
        let prompt = build_prompt(Q, A);
        assert!(prompt.contains(Q));
        assert!(prompt.contains(A));
    }
}
