use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn faqh_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("faqh");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[data]
dir = "{root}/data"

[mail]
provider = "file"
path = "{root}/mail.json"
agent_address = "agent@co"
max_messages = 20

[schedule]
interval_secs = 60

[vector]
provider = "local"
batch_size = 10

[embedding]
provider = "openai"
model = "text-embedding-3-small"
dims = 1536

[server]
bind = "127.0.0.1:7341"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("faqh.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn write_mail(root: &Path, messages: &str) {
    fs::write(root.join("mail.json"), messages).unwrap();
}

fn write_faqs(root: &Path) {
    let data = root.join("data");
    fs::create_dir_all(&data).unwrap();
    fs::write(
        data.join("faq_metadata.json"),
        r#"[
  {
    "question": "How do I reset my password?",
    "answer": "Go to Settings > Reset.",
    "topic": "Account access",
    "keywords": ["password", "reset", "settings"],
    "source_email_id": "2",
    "conversation_id": "5",
    "timestamp": "2024-05-01T10:05:00Z"
  },
  {
    "question": "Can I export my data to CSV?",
    "answer": "Yes, use Reports > Export.",
    "topic": "Reporting",
    "keywords": ["export", "csv", "reports"],
    "source_email_id": "9",
    "conversation_id": "8",
    "timestamp": "2024-06-01T08:30:00Z"
  }
]"#,
    )
    .unwrap();
    fs::write(data.join("vectorized_state.json"), r#"["2"]"#).unwrap();
}

fn run_faqh(config_path: &Path, args: &[&str], envs: &[(&str, &str)]) -> (String, String, bool) {
    let binary = faqh_binary();
    let mut cmd = Command::new(&binary);
    cmd.arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("GEMINI_API_KEY")
        .env_remove("OPENAI_API_KEY")
        .env_remove("PINECONE_API_KEY")
        .env_remove("GRAPH_ACCESS_TOKEN")
        .env_remove("RUST_LOG");
    for (k, v) in envs {
        cmd.env(k, v);
    }
    let output = cmd
        .output()
        .unwrap_or_else(|e| panic!("Failed to run faqh binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_status_on_fresh_data_dir() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_faqh(&config_path, &["status"], &[]);
    assert!(success, "status failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("FAQ records:   0"));
    assert!(stdout.contains("Processed ids: 0"));
}

#[test]
fn test_status_counts_pending_vectorization() {
    let (tmp, config_path) = setup_test_env();
    write_faqs(tmp.path());

    let (stdout, _, success) = run_faqh(&config_path, &["status"], &[]);
    assert!(success);
    assert!(stdout.contains("FAQ records:   2"));
    assert!(stdout.contains("Vectorized:    1 (1 pending)"));
}

#[test]
fn test_faqs_lists_newest_first() {
    let (tmp, config_path) = setup_test_env();
    write_faqs(tmp.path());

    let (stdout, stderr, success) = run_faqh(&config_path, &["faqs"], &[]);
    assert!(success, "faqs failed: stdout={}, stderr={}", stdout, stderr);
    let export = stdout.find("Reporting").unwrap();
    let reset = stdout.find("Account access").unwrap();
    assert!(export < reset);
    assert!(stdout.contains("Q: How do I reset my password?"));

    let (limited, _, _) = run_faqh(&config_path, &["faqs", "--limit", "1"], &[]);
    assert!(limited.contains("Reporting"));
    assert!(!limited.contains("Account access"));
}

#[test]
fn test_faqs_empty_store() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_faqh(&config_path, &["faqs"], &[]);
    assert!(success);
    assert!(stdout.contains("No FAQ records."));
}

#[test]
fn test_corrupt_faq_store_is_an_error() {
    let (tmp, config_path) = setup_test_env();
    let data = tmp.path().join("data");
    fs::create_dir_all(&data).unwrap();
    fs::write(data.join("faq_metadata.json"), "{ not json").unwrap();

    let (_, stderr, success) = run_faqh(&config_path, &["faqs"], &[]);
    assert!(!success);
    assert!(stderr.contains("FAQ store"));
    // Left untouched for the operator to inspect.
    assert_eq!(
        fs::read_to_string(data.join("faq_metadata.json")).unwrap(),
        "{ not json"
    );
}

#[test]
fn test_extract_without_gemini_key_fails_before_any_tick() {
    let (tmp, config_path) = setup_test_env();
    write_mail(tmp.path(), "[]");

    let (_, stderr, success) = run_faqh(&config_path, &["extract"], &[]);
    assert!(!success);
    assert!(stderr.contains("GEMINI_API_KEY"));
    assert!(!tmp.path().join("data/processed_state.json").exists());
}

#[test]
fn test_extract_with_missing_mail_export_fails() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_faqh(
        &config_path,
        &["extract"],
        &[("GEMINI_API_KEY", "test-key")],
    );
    assert!(!success);
    assert!(stderr.contains("mail fetch failed"));
}

#[test]
fn test_extract_without_candidates_needs_no_validator_call() {
    let (tmp, config_path) = setup_test_env();
    // Agent-only conversation plus a message without a conversation id.
    write_mail(
        tmp.path(),
        r#"[
  {
    "id": "10",
    "conversationId": "6",
    "sender": { "emailAddress": { "address": "agent@co" } },
    "subject": "Maintenance",
    "receivedDateTime": "2024-05-01T09:00:00Z",
    "body": { "contentType": "html", "content": "<p>Scheduled maintenance tonight.</p>" }
  },
  {
    "id": "11",
    "conversationId": "6",
    "sender": { "emailAddress": { "address": "agent@co" } },
    "subject": "Maintenance",
    "receivedDateTime": "2024-05-01T09:30:00Z",
    "body": { "contentType": "html", "content": "<p>Maintenance finished.</p>" }
  },
  {
    "id": "12",
    "sender": { "emailAddress": { "address": "user@x" } },
    "receivedDateTime": "2024-05-01T10:00:00Z",
    "body": { "contentType": "text", "content": "Where is my invoice?" }
  }
]"#,
    );

    let (stdout, stderr, success) = run_faqh(
        &config_path,
        &["extract"],
        &[("GEMINI_API_KEY", "test-key")],
    );
    assert!(success, "extract failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("fetched: 3 messages"));
    assert!(stdout.contains("conversations: 1"));
    assert!(stdout.contains("candidates: 0"));
    assert!(stdout.contains("ok"));
}

#[test]
fn test_vectorize_dry_run_needs_no_credentials() {
    let (tmp, config_path) = setup_test_env();
    write_faqs(tmp.path());

    let (stdout, stderr, success) = run_faqh(&config_path, &["vectorize", "--dry-run"], &[]);
    assert!(success, "vectorize failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("vectorize (dry-run)"));
    assert!(stdout.contains("pending: 1"));
    assert_eq!(
        fs::read_to_string(tmp.path().join("data/vectorized_state.json")).unwrap(),
        r#"["2"]"#
    );
}

#[test]
fn test_vectorize_without_embedding_key_fails() {
    let (tmp, config_path) = setup_test_env();
    write_faqs(tmp.path());

    let (_, stderr, success) = run_faqh(&config_path, &["vectorize"], &[]);
    assert!(!success);
    assert!(stderr.contains("OPENAI_API_KEY"));
}

#[test]
fn test_search_empty_query() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_faqh(&config_path, &["search", "   "], &[]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_missing_config_file_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_faqh(&tmp.path().join("nope.toml"), &["status"], &[]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_config_without_mail_section_fails() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("faqh.toml");
    fs::write(&config_path, "[schedule]\ninterval_secs = 60\n").unwrap();

    let (_, stderr, success) = run_faqh(&config_path, &["status"], &[]);
    assert!(!success);
    assert!(stderr.contains("Failed to parse config file"));
}
