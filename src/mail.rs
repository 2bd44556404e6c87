//! Mail sources: where the extraction loop gets its messages from.
//!
//! A [`MailSource`] exposes two things: the authenticated identity (the
//! support agent's address, used to tell answers from questions) and a
//! bounded window of recent messages. Authentication itself is outside this
//! crate; the Graph source takes an already-issued bearer token.
//!
//! | Provider | Type | Notes |
//! |----------|------|-------|
//! | `graph` | [`GraphMailSource`] | Microsoft Graph `/me/messages`, paged via `@odata.nextLink` |
//! | `file` | [`FileMailSource`] | JSON array of Graph-shaped messages on disk |
//!
//! Both feed raw JSON through [`parse_graph_message`], the validation
//! boundary: malformed records are skipped with a warning and never reach
//! the pipeline.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::MailConfig;
use crate::error::PipelineError;
use crate::models::Message;

/// Environment variable holding the Graph bearer token.
pub const GRAPH_TOKEN_ENV: &str = "GRAPH_ACCESS_TOKEN";

const GRAPH_SELECT: &str = "id,conversationId,sender,subject,receivedDateTime,body";

#[async_trait]
pub trait MailSource: Send + Sync {
    /// Address of the authenticated support agent.
    fn agent_address(&self) -> &str;

    /// Fetch up to `max_count` of the most recent messages.
    async fn fetch_recent(&self, max_count: usize) -> Result<Vec<Message>>;
}

/// Build the configured mail source.
///
/// Resolves credentials and identity up front; any failure is an
/// initialization error and no tick may run.
pub async fn create_source(config: &MailConfig) -> Result<Box<dyn MailSource>, PipelineError> {
    match config.provider.as_str() {
        "graph" => Ok(Box::new(
            GraphMailSource::connect(config)
                .await
                .map_err(PipelineError::Initialization)?,
        )),
        "file" => Ok(Box::new(
            FileMailSource::from_config(config).map_err(PipelineError::Initialization)?,
        )),
        other => Err(PipelineError::Initialization(anyhow::anyhow!(
            "Unknown mail provider: {}",
            other
        ))),
    }
}

/// Convert one Graph message object into a validated [`Message`].
///
/// Requires a non-empty `id` and an RFC 3339 `receivedDateTime`. A missing
/// sender becomes the empty address and a missing body the empty string.
pub fn parse_graph_message(value: &Value) -> Option<Message> {
    let id = value.get("id")?.as_str()?.trim();
    if id.is_empty() {
        return None;
    }

    let received_at = value
        .get("receivedDateTime")
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())?
        .with_timezone(&Utc);

    let conversation_id = value
        .get("conversationId")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let sender_address = value
        .pointer("/sender/emailAddress/address")
        .or_else(|| value.pointer("/from/emailAddress/address"))
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    let subject = value
        .get("subject")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let raw_body = value
        .pointer("/body/content")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    Some(Message {
        id: id.to_string(),
        conversation_id,
        sender_address,
        subject,
        received_at,
        raw_body,
    })
}

fn parse_batch(values: &[Value]) -> Vec<Message> {
    values
        .iter()
        .filter_map(|v| {
            let parsed = parse_graph_message(v);
            if parsed.is_none() {
                warn!(
                    id = v.get("id").and_then(|i| i.as_str()).unwrap_or("<missing>"),
                    "skipping malformed message"
                );
            }
            parsed
        })
        .collect()
}

// ============ Microsoft Graph ============

/// Mail source backed by the Microsoft Graph API.
pub struct GraphMailSource {
    client: reqwest::Client,
    base_url: String,
    token: String,
    page_size: usize,
    agent: String,
}

impl GraphMailSource {
    /// Read the token from [`GRAPH_TOKEN_ENV`] and resolve the identity.
    pub async fn connect(config: &MailConfig) -> Result<Self> {
        let token = std::env::var(GRAPH_TOKEN_ENV)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", GRAPH_TOKEN_ENV))?;
        Self::with_token(config, token).await
    }

    /// Connect with an explicit bearer token.
    ///
    /// Uses `mail.agent_address` when configured, otherwise `GET /me`
    /// (`mail`, falling back to `userPrincipalName`).
    pub async fn with_token(config: &MailConfig, token: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let mut source = Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token,
            page_size: config.page_size.max(1),
            agent: String::new(),
        };

        source.agent = match &config.agent_address {
            Some(addr) => addr.clone(),
            None => source.fetch_identity().await?,
        };
        debug!(agent = %source.agent, "graph identity resolved");
        Ok(source)
    }

    async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await
            .with_context(|| format!("GET {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Graph API error {}: {}", status, body);
        }
        Ok(response.json().await?)
    }

    async fn fetch_identity(&self) -> Result<String> {
        let profile = self.get_json(&format!("{}/me", self.base_url), &[]).await?;
        profile
            .get("mail")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .or_else(|| profile.get("userPrincipalName").and_then(|v| v.as_str()))
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("Graph profile has neither mail nor userPrincipalName"))
    }
}

#[async_trait]
impl MailSource for GraphMailSource {
    fn agent_address(&self) -> &str {
        &self.agent
    }

    async fn fetch_recent(&self, max_count: usize) -> Result<Vec<Message>> {
        let mut raw: Vec<Value> = Vec::new();
        let mut url = format!("{}/me/messages", self.base_url);
        let mut query = vec![
            ("$top", self.page_size.min(max_count).to_string()),
            ("$orderby", "receivedDateTime desc".to_string()),
            ("$select", GRAPH_SELECT.to_string()),
        ];

        loop {
            let page = self.get_json(&url, &query).await?;
            let batch = page
                .get("value")
                .and_then(|v| v.as_array())
                .ok_or_else(|| anyhow::anyhow!("Graph response missing 'value' array"))?;
            raw.extend(batch.iter().cloned());
            debug!(page = batch.len(), total = raw.len(), "fetched message page");

            if raw.len() >= max_count {
                break;
            }
            match page.get("@odata.nextLink").and_then(|v| v.as_str()) {
                // The next link already carries every query parameter.
                Some(next) => {
                    url = next.to_string();
                    query.clear();
                }
                None => break,
            }
        }

        raw.truncate(max_count);
        Ok(parse_batch(&raw))
    }
}

// ============ JSON file ============

/// Mail source reading a JSON array of Graph-shaped messages from disk.
///
/// The file is re-read on every fetch, so an export can be replaced while
/// the scheduler runs.
pub struct FileMailSource {
    path: PathBuf,
    agent: String,
}

impl FileMailSource {
    pub fn new(path: impl Into<PathBuf>, agent_address: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            agent: agent_address.into(),
        }
    }

    pub fn from_config(config: &MailConfig) -> Result<Self> {
        let path = config
            .path
            .clone()
            .ok_or_else(|| anyhow::anyhow!("mail.path required for file provider"))?;
        let agent = config
            .agent_address
            .clone()
            .ok_or_else(|| anyhow::anyhow!("mail.agent_address required for file provider"))?;
        Ok(Self::new(path, agent))
    }
}

#[async_trait]
impl MailSource for FileMailSource {
    fn agent_address(&self) -> &str {
        &self.agent
    }

    async fn fetch_recent(&self, max_count: usize) -> Result<Vec<Message>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read mail export {}", self.path.display()))?;
        let values: Vec<Value> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse mail export {}", self.path.display()))?;

        let mut messages = parse_batch(&values);
        messages.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        messages.truncate(max_count);
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn graph_msg(id: &str, sender: &str, at: &str) -> Value {
        json!({
            "id": id,
            "conversationId": "conv-1",
            "subject": "Password",
            "receivedDateTime": at,
            "sender": { "emailAddress": { "name": "X", "address": sender } },
            "body": { "contentType": "html", "content": "<p>Body text here</p>" }
        })
    }

    #[test]
    fn test_parse_full_message() {
        let msg = parse_graph_message(&graph_msg("m1", "user@x", "2024-03-01T10:00:00Z")).unwrap();
        assert_eq!(msg.id, "m1");
        assert_eq!(msg.conversation_id.as_deref(), Some("conv-1"));
        assert_eq!(msg.sender_address, "user@x");
        assert_eq!(msg.subject.as_deref(), Some("Password"));
        assert_eq!(msg.raw_body, "<p>Body text here</p>");
        assert_eq!(msg.received_at.to_rfc3339(), "2024-03-01T10:00:00+00:00");
    }

    #[test]
    fn test_parse_rejects_missing_id_or_date() {
        let mut no_id = graph_msg("m1", "user@x", "2024-03-01T10:00:00Z");
        no_id.as_object_mut().unwrap().remove("id");
        assert!(parse_graph_message(&no_id).is_none());

        let bad_date = graph_msg("m1", "user@x", "yesterday");
        assert!(parse_graph_message(&bad_date).is_none());
    }

    #[test]
    fn test_parse_tolerates_missing_sender_and_body() {
        let value = json!({ "id": "m9", "receivedDateTime": "2024-03-01T10:00:00Z" });
        let msg = parse_graph_message(&value).unwrap();
        assert_eq!(msg.sender_address, "");
        assert_eq!(msg.raw_body, "");
        assert!(msg.conversation_id.is_none());
    }

    #[tokio::test]
    async fn test_file_source_returns_most_recent_window() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("mail.json");
        let values = json!([
            graph_msg("old", "user@x", "2024-03-01T09:00:00Z"),
            graph_msg("new", "user@x", "2024-03-01T11:00:00Z"),
            { "id": "broken" },
            graph_msg("mid", "user@x", "2024-03-01T10:00:00Z"),
        ]);
        std::fs::write(&path, values.to_string()).unwrap();

        let source = FileMailSource::new(&path, "agent@co");
        assert_eq!(source.agent_address(), "agent@co");
        let msgs = source.fetch_recent(2).await.unwrap();
        let ids: Vec<&str> = msgs.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid"]);
    }

    #[tokio::test]
    async fn test_file_source_missing_file_is_error() {
        let source = FileMailSource::new("/nonexistent/mail.json", "agent@co");
        assert!(source.fetch_recent(10).await.is_err());
    }
}
