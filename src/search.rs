//! Similarity search over the vector index (`faqh search`).

use anyhow::{Context, Result};
use serde_json::Value;

use crate::config::Config;
use crate::vector::{self, SearchHit, VectorGateway};

/// Query the configured vector gateway and print ranked hits.
///
/// An empty or whitespace-only query prints `No results.` without calling
/// the gateway. `top_k` defaults to `vector.top_k`.
pub async fn run_search(config: &Config, query: &str, top_k: Option<usize>) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let gateway = vector::create_gateway(config).context("Failed to initialize vector index")?;
    let top_k = top_k.unwrap_or(config.vector.top_k);
    let hits = search_faqs(gateway.as_ref(), query, top_k).await?;

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        print_hit(i + 1, hit);
    }
    Ok(())
}

/// Run a search with the query trimmed and `top_k` clamped to at least one.
pub async fn search_faqs(
    gateway: &dyn VectorGateway,
    query: &str,
    top_k: usize,
) -> Result<Vec<SearchHit>> {
    gateway
        .search(query.trim(), top_k.max(1))
        .await
        .with_context(|| format!("Search failed for query {:?}", query.trim()))
}

fn payload_str<'a>(payload: &'a Value, key: &str) -> &'a str {
    payload.get(key).and_then(|v| v.as_str()).unwrap_or("")
}

fn print_hit(rank: usize, hit: &SearchHit) {
    let topic = payload_str(&hit.payload, "topic");
    let topic = if topic.is_empty() { "(no topic)" } else { topic };
    println!("{}. [{:.2}] {}", rank, hit.score, topic);
    println!(
        "    question: \"{}\"",
        excerpt(payload_str(&hit.payload, "question"))
    );
    println!(
        "    answer: \"{}\"",
        excerpt(payload_str(&hit.payload, "answer"))
    );
    println!("    id: {}", hit.id);
    println!();
}

/// Single-line excerpt of at most 160 characters.
fn excerpt(text: &str) -> String {
    const MAX_CHARS: usize = 160;
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= MAX_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(MAX_CHARS).collect();
    format!("{}...", cut.trim_end())
}
