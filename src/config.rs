use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,
    pub mail: MailConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub validator: ValidatorConfig,
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_processed_file")]
    pub processed_ledger: String,
    #[serde(default = "default_faq_file")]
    pub faq_store: String,
    #[serde(default = "default_vectorized_file")]
    pub vectorized_ledger: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: default_data_dir(),
            processed_ledger: default_processed_file(),
            faq_store: default_faq_file(),
            vectorized_ledger: default_vectorized_file(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_processed_file() -> String {
    "processed_state.json".to_string()
}
fn default_faq_file() -> String {
    "faq_metadata.json".to_string()
}
fn default_vectorized_file() -> String {
    "vectorized_state.json".to_string()
}

impl DataConfig {
    pub fn processed_ledger_path(&self) -> PathBuf {
        self.dir.join(&self.processed_ledger)
    }
    pub fn faq_store_path(&self) -> PathBuf {
        self.dir.join(&self.faq_store)
    }
    pub fn vectorized_ledger_path(&self) -> PathBuf {
        self.dir.join(&self.vectorized_ledger)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MailConfig {
    /// `graph` (Microsoft Graph) or `file` (JSON export on disk).
    #[serde(default = "default_mail_provider")]
    pub provider: String,
    /// Size of the recent-message window fetched per tick.
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Overrides the identity reported by the mail source.
    #[serde(default)]
    pub agent_address: Option<String>,
    /// Path to the message export (`file` provider).
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_graph_base_url")]
    pub base_url: String,
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_mail_provider() -> String {
    "graph".to_string()
}
fn default_max_messages() -> usize {
    50
}
fn default_page_size() -> usize {
    50
}
fn default_graph_base_url() -> String {
    "https://graph.microsoft.com/v1.0".to_string()
}
fn default_http_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScheduleConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

fn default_interval_secs() -> u64 {
    600
}

impl ScheduleConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// What to do with an answer id whose validation call faulted.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FaultPolicy {
    /// Record the fault like a rejection: the id is never sent again.
    #[default]
    Mark,
    /// Leave the id unmarked so the next tick evaluates it again.
    Retry,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ValidatorConfig {
    #[serde(default = "default_validator_provider")]
    pub provider: String,
    #[serde(default = "default_validator_model")]
    pub model: String,
    #[serde(default = "default_validator_base_url")]
    pub base_url: String,
    #[serde(default = "default_validator_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub on_fault: FaultPolicy,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            provider: default_validator_provider(),
            model: default_validator_model(),
            base_url: default_validator_base_url(),
            timeout_secs: default_validator_timeout_secs(),
            on_fault: FaultPolicy::default(),
        }
    }
}

fn default_validator_provider() -> String {
    "gemini".to_string()
}
fn default_validator_model() -> String {
    "gemini-2.5-flash".to_string()
}
fn default_validator_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}
fn default_validator_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorConfig {
    /// `local` (JSON index + embedding provider) or `pinecone`.
    #[serde(default = "default_vector_provider")]
    pub provider: String,
    #[serde(default = "default_vector_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_index_file")]
    pub index_file: String,
    #[serde(default)]
    pub index_host: Option<String>,
    #[serde(default = "default_pinecone_model")]
    pub model: String,
    #[serde(default = "default_pinecone_api_url")]
    pub api_url: String,
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            provider: default_vector_provider(),
            batch_size: default_vector_batch_size(),
            top_k: default_top_k(),
            index_file: default_index_file(),
            index_host: None,
            model: default_pinecone_model(),
            api_url: default_pinecone_api_url(),
            timeout_secs: default_http_timeout_secs(),
        }
    }
}

fn default_vector_provider() -> String {
    "local".to_string()
}
fn default_vector_batch_size() -> usize {
    96
}
fn default_top_k() -> usize {
    3
}
fn default_index_file() -> String {
    "vector_index.json".to_string()
}
fn default_pinecone_model() -> String {
    "multilingual-e5-large".to_string()
}
fn default_pinecone_api_url() -> String {
    "https://api.pinecone.io".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_max_retries() -> u32 {
    5
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Mail
    if config.mail.max_messages == 0 {
        anyhow::bail!("mail.max_messages must be > 0");
    }
    if config.mail.page_size == 0 {
        anyhow::bail!("mail.page_size must be > 0");
    }
    match config.mail.provider.as_str() {
        "graph" => {}
        "file" => {
            if config.mail.path.is_none() {
                anyhow::bail!("mail.path must be set when provider is 'file'");
            }
            if config.mail.agent_address.is_none() {
                anyhow::bail!("mail.agent_address must be set when provider is 'file'");
            }
        }
        other => anyhow::bail!(
            "Unknown mail provider: '{}'. Must be graph or file.",
            other
        ),
    }

    // Schedule
    if config.schedule.interval_secs == 0 {
        anyhow::bail!("schedule.interval_secs must be > 0");
    }

    // Validator
    if config.validator.timeout_secs == 0 {
        anyhow::bail!("validator.timeout_secs must be > 0");
    }
    match config.validator.provider.as_str() {
        "gemini" => {}
        other => anyhow::bail!("Unknown validator provider: '{}'. Must be gemini.", other),
    }

    // Vector
    if config.vector.batch_size == 0 {
        anyhow::bail!("vector.batch_size must be > 0");
    }
    if config.vector.top_k == 0 {
        anyhow::bail!("vector.top_k must be >= 1");
    }
    match config.vector.provider.as_str() {
        "local" => {
            if !config.embedding.is_enabled() {
                anyhow::bail!(
                    "vector.provider 'local' requires an [embedding] provider to be configured"
                );
            }
        }
        "pinecone" => {
            if config.vector.index_host.is_none() {
                anyhow::bail!("vector.index_host must be set when provider is 'pinecone'");
            }
        }
        other => anyhow::bail!(
            "Unknown vector provider: '{}'. Must be local or pinecone.",
            other
        ),
    }

    // Embedding
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[mail]
provider = "graph"

[vector]
provider = "pinecone"
index_host = "faq-abc123.svc.pinecone.io"
"#;

    #[test]
    fn test_defaults() {
        let cfg = parse_config(MINIMAL).unwrap();
        assert_eq!(cfg.mail.max_messages, 50);
        assert_eq!(cfg.schedule.interval(), Duration::from_secs(600));
        assert_eq!(cfg.validator.on_fault, FaultPolicy::Mark);
        assert_eq!(cfg.validator.model, "gemini-2.5-flash");
        assert_eq!(
            cfg.data.processed_ledger_path(),
            PathBuf::from("./data/processed_state.json")
        );
        assert_eq!(
            cfg.data.vectorized_ledger_path(),
            PathBuf::from("./data/vectorized_state.json")
        );
        assert_eq!(cfg.vector.model, "multilingual-e5-large");
    }

    #[test]
    fn test_retry_fault_policy() {
        let content = format!("{}\n[validator]\non_fault = \"retry\"\n", MINIMAL);
        let cfg = parse_config(&content).unwrap();
        assert_eq!(cfg.validator.on_fault, FaultPolicy::Retry);
    }

    #[test]
    fn test_file_provider_requires_path_and_agent() {
        let content = r#"
[mail]
provider = "file"
path = "./mail.json"

[vector]
provider = "pinecone"
index_host = "h"
"#;
        let err = parse_config(content).unwrap_err();
        assert!(err.to_string().contains("agent_address"));
    }

    #[test]
    fn test_local_index_requires_embeddings() {
        let content = "[mail]\nprovider = \"graph\"\n";
        let err = parse_config(content).unwrap_err();
        assert!(err.to_string().contains("embedding"));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let content = format!("{}\n[schedule]\ninterval_secs = 0\n", MINIMAL);
        assert!(parse_config(&content).is_err());
    }

    #[test]
    fn test_unknown_providers_rejected() {
        let bad_mail = MINIMAL.replace("\"graph\"", "\"imap\"");
        assert!(parse_config(&bad_mail).is_err());
        let bad_validator = format!("{}\n[validator]\nprovider = \"other\"\n", MINIMAL);
        assert!(parse_config(&bad_validator).is_err());
    }
}
