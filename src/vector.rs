//! Vector index abstraction.
//!
//! A [`VectorGateway`] embeds and stores FAQ records keyed by their source
//! email id and answers similarity queries over them. `upsert` must be an
//! idempotent replace-by-key: the vectorization pass updates its ledger
//! only after a successful upsert, so a crash in between re-sends the same
//! ids and must not create duplicates.
//!
//! | Provider | Type |
//! |----------|------|
//! | `local` | [`LocalVectorIndex`] — JSON file, any [`Embedder`], brute-force cosine |
//! | `pinecone` | [`PineconeGateway`](crate::pinecone::PineconeGateway) |

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::embedding::{self, cosine_similarity, Embedder};
use crate::persist;

/// One record handed to [`VectorGateway::upsert`].
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub embedding_text: String,
    pub payload: Value,
}

/// One ranked result from [`VectorGateway::search`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub payload: Value,
}

#[async_trait]
pub trait VectorGateway: Send + Sync {
    /// Embed and insert-or-replace `records` by id. Returns how many were written.
    async fn upsert(&self, records: &[VectorRecord]) -> Result<usize>;

    /// Return up to `top_k` hits for `query`, best first.
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>>;
}

/// Build the configured vector gateway.
pub fn create_gateway(config: &Config) -> Result<Box<dyn VectorGateway>> {
    match config.vector.provider.as_str() {
        "local" => {
            let embedder = embedding::create_embedder(&config.embedding)?;
            let path = config.data.dir.join(&config.vector.index_file);
            Ok(Box::new(LocalVectorIndex::open(path, embedder)?))
        }
        "pinecone" => Ok(Box::new(crate::pinecone::PineconeGateway::new(
            &config.vector,
        )?)),
        other => anyhow::bail!("Unknown vector provider: {}", other),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    id: String,
    vector: Vec<f32>,
    payload: Value,
}

/// File-backed vector index for single-machine deployments and tests.
///
/// Entries live in memory and the whole index is rewritten atomically after
/// each upsert.
pub struct LocalVectorIndex {
    path: PathBuf,
    embedder: Box<dyn Embedder>,
    entries: Mutex<Vec<IndexEntry>>,
}

impl LocalVectorIndex {
    pub fn open(path: impl Into<PathBuf>, embedder: Box<dyn Embedder>) -> Result<Self> {
        let path = path.into();
        let entries: Vec<IndexEntry> = persist::read_json(&path)
            .with_context(|| format!("Failed to load vector index {}", path.display()))?
            .unwrap_or_default();
        Ok(Self {
            path,
            embedder,
            entries: Mutex::new(entries),
        })
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl VectorGateway for LocalVectorIndex {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = records.iter().map(|r| r.embedding_text.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        if vectors.len() != records.len() {
            anyhow::bail!(
                "embedder returned {} vectors for {} records",
                vectors.len(),
                records.len()
            );
        }
        let dims = self.embedder.dims();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
            anyhow::bail!(
                "{} returned a {}-dimensional vector, expected {}",
                self.embedder.model_name(),
                bad.len(),
                dims
            );
        }

        let mut entries = self.entries.lock().await;
        let mut updated = entries.clone();
        let mut positions: HashMap<String, usize> = updated
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id.clone(), i))
            .collect();

        for (record, vector) in records.iter().zip(vectors) {
            let entry = IndexEntry {
                id: record.id.clone(),
                vector,
                payload: record.payload.clone(),
            };
            match positions.get(&record.id) {
                Some(&i) => updated[i] = entry,
                None => {
                    positions.insert(record.id.clone(), updated.len());
                    updated.push(entry);
                }
            }
        }

        persist::write_json_atomic(&self.path, &updated)?;
        *entries = updated;
        Ok(records.len())
    }

    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        if self.is_empty().await {
            return Ok(Vec::new());
        }
        let query_vec = embedding::embed_query(self.embedder.as_ref(), query).await?;
        let entries = self.entries.lock().await;

        let mut hits: Vec<SearchHit> = entries
            .iter()
            .map(|e| SearchHit {
                id: e.id.clone(),
                score: cosine_similarity(&query_vec, &e.vector),
                payload: e.payload.clone(),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    /// Letter-frequency embedder: deterministic and good enough to rank.
    struct LetterEmbedder;

    #[async_trait]
    impl Embedder for LetterEmbedder {
        fn model_name(&self) -> &str {
            "letters"
        }
        fn dims(&self) -> usize {
            26
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0f32; 26];
                    for c in t.to_ascii_lowercase().bytes() {
                        if c.is_ascii_lowercase() {
                            v[(c - b'a') as usize] += 1.0;
                        }
                    }
                    v
                })
                .collect())
        }
    }

    fn record(id: &str, text: &str) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            embedding_text: text.to_string(),
            payload: json!({ "source_email_id": id, "question": text }),
        }
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_id() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("vector_index.json");
        let index = LocalVectorIndex::open(&path, Box::new(LetterEmbedder)).unwrap();

        index.upsert(&[record("1", "aaaa"), record("2", "bbbb")]).await.unwrap();
        index.upsert(&[record("1", "cccc")]).await.unwrap();
        assert_eq!(index.len().await, 2);

        let reopened = LocalVectorIndex::open(&path, Box::new(LetterEmbedder)).unwrap();
        assert_eq!(reopened.len().await, 2);
        let hits = reopened.search("cc", 1).await.unwrap();
        assert_eq!(hits[0].id, "1");
        assert_eq!(hits[0].payload["question"], "cccc");
    }

    #[tokio::test]
    async fn test_search_ranks_and_truncates() {
        let tmp = TempDir::new().unwrap();
        let index =
            LocalVectorIndex::open(tmp.path().join("idx.json"), Box::new(LetterEmbedder)).unwrap();
        index
            .upsert(&[
                record("x", "xxxx yyyy"),
                record("z", "zzzz"),
                record("y", "yyyy"),
            ])
            .await
            .unwrap();

        let hits = index.search("yyy", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "y");
        assert_eq!(hits[1].id, "x");
        assert!(hits[0].score >= hits[1].score);
    }

    /// Claims 26 dimensions but returns 3.
    struct ShortEmbedder;

    #[async_trait]
    impl Embedder for ShortEmbedder {
        fn model_name(&self) -> &str {
            "short-model"
        }
        fn dims(&self) -> usize {
            26
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0]).collect())
        }
    }

    #[tokio::test]
    async fn test_wrong_dimensions_rejected_before_write() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("idx.json");
        let index = LocalVectorIndex::open(&path, Box::new(ShortEmbedder)).unwrap();

        let err = index.upsert(&[record("1", "aaaa")]).await.unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("short-model"), "got {msg}");
        assert!(msg.contains("expected 26"), "got {msg}");
        assert!(!path.exists());
        assert!(index.is_empty().await);
    }

    #[tokio::test]
    async fn test_empty_upsert_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("idx.json");
        let index = LocalVectorIndex::open(&path, Box::new(LetterEmbedder)).unwrap();
        assert_eq!(index.upsert(&[]).await.unwrap(), 0);
        assert!(!path.exists());
        assert!(index.search("anything", 3).await.unwrap().is_empty());
    }
}
