//! Pinecone-backed [`VectorGateway`].
//!
//! Embeddings come from Pinecone's hosted inference endpoint (`/embed`),
//! vectors are written with `/vectors/upsert` and queried with `/query` on
//! the index host. Pinecone upserts overwrite by id, which is what makes
//! re-running a vectorization pass safe.
//!
//! Requires the `PINECONE_API_KEY` environment variable.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::VectorConfig;
use crate::vector::{SearchHit, VectorGateway, VectorRecord};

pub const PINECONE_KEY_ENV: &str = "PINECONE_API_KEY";
const API_VERSION: &str = "2025-01";

pub struct PineconeGateway {
    client: reqwest::Client,
    api_key: String,
    api_url: String,
    index_url: String,
    model: String,
}

impl PineconeGateway {
    pub fn new(config: &VectorConfig) -> Result<Self> {
        let api_key = std::env::var(PINECONE_KEY_ENV)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", PINECONE_KEY_ENV))?;
        let host = config
            .index_host
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("vector.index_host required for Pinecone"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            index_url: index_url(host),
            model: config.model.clone(),
        })
    }

    async fn post(&self, url: &str, body: &Value) -> Result<Value> {
        let response = self
            .client
            .post(url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Pinecone API error {}: {}", status, body_text);
        }
        Ok(response.json().await?)
    }

    /// `input_type` is `passage` for stored records and `query` for searches.
    async fn embed(&self, texts: &[String], input_type: &str) -> Result<Vec<Vec<f32>>> {
        let inputs: Vec<Value> = texts.iter().map(|t| json!({ "text": t })).collect();
        let body = json!({
            "model": self.model,
            "parameters": { "input_type": input_type, "truncate": "END" },
            "inputs": inputs,
        });
        let response = self.post(&format!("{}/embed", self.api_url), &body).await?;
        parse_embed_response(&response, texts.len())
    }
}

fn index_url(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

fn parse_embed_response(json: &Value, expected: usize) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Pinecone embed response: missing data"))?;
    let vectors: Vec<Vec<f32>> = data
        .iter()
        .map(|item| {
            item.get("values")
                .and_then(|v| v.as_array())
                .map(|vals| vals.iter().map(|x| x.as_f64().unwrap_or(0.0) as f32).collect())
                .ok_or_else(|| anyhow::anyhow!("Invalid Pinecone embed response: missing values"))
        })
        .collect::<Result<_>>()?;
    if vectors.len() != expected {
        bail!(
            "Pinecone returned {} embeddings for {} inputs",
            vectors.len(),
            expected
        );
    }
    Ok(vectors)
}

/// Pinecone metadata must be flat: strings, numbers, booleans or lists of
/// strings. Nested values are dropped and nulls skipped.
fn flatten_metadata(payload: &Value, text: &str) -> Value {
    let mut meta = serde_json::Map::new();
    if let Some(obj) = payload.as_object() {
        for (key, value) in obj {
            match value {
                Value::String(_) | Value::Number(_) | Value::Bool(_) => {
                    meta.insert(key.clone(), value.clone());
                }
                Value::Array(items) if items.iter().all(|i| i.is_string()) => {
                    meta.insert(key.clone(), value.clone());
                }
                _ => {}
            }
        }
    }
    meta.insert("text".to_string(), Value::String(text.to_string()));
    Value::Object(meta)
}

fn parse_matches(json: &Value) -> Result<Vec<SearchHit>> {
    let matches = json
        .get("matches")
        .and_then(|m| m.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Pinecone query response: missing matches"))?;
    Ok(matches
        .iter()
        .filter_map(|m| {
            Some(SearchHit {
                id: m.get("id")?.as_str()?.to_string(),
                score: m.get("score").and_then(|s| s.as_f64()).unwrap_or(0.0) as f32,
                payload: m.get("metadata").cloned().unwrap_or(Value::Null),
            })
        })
        .collect())
}

#[async_trait]
impl VectorGateway for PineconeGateway {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let texts: Vec<String> = records.iter().map(|r| r.embedding_text.clone()).collect();
        let vectors = self.embed(&texts, "passage").await?;

        let body_vectors: Vec<Value> = records
            .iter()
            .zip(vectors)
            .map(|(r, values)| {
                json!({
                    "id": r.id,
                    "values": values,
                    "metadata": flatten_metadata(&r.payload, &r.embedding_text),
                })
            })
            .collect();

        let response = self
            .post(
                &format!("{}/vectors/upsert", self.index_url),
                &json!({ "vectors": body_vectors }),
            )
            .await?;
        let count = response
            .get("upsertedCount")
            .and_then(|c| c.as_u64())
            .map(|c| c as usize)
            .unwrap_or(records.len());
        Ok(count)
    }

    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        let query_vec = self
            .embed(&[query.to_string()], "query")
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))?;
        let body = json!({
            "vector": query_vec,
            "topK": top_k,
            "includeMetadata": true,
        });
        let response = self.post(&format!("{}/query", self.index_url), &body).await?;
        parse_matches(&response)
    }
}
