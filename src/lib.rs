//! # FAQ Harvester
//!
//! Turns a support mailbox into a searchable FAQ knowledge base.
//!
//! On a fixed schedule the harvester pulls recent mail, groups it into
//! conversations, extracts one customer-question / agent-answer pair per
//! conversation, asks a language model whether the pair is a reusable FAQ
//! and records the accepted ones. A separate on-demand pass pushes accepted
//! records into a vector index for similarity search.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌───────────┐   ┌────────────┐
//! │  Mail    │──▶│ Conversation │──▶│ Validator │──▶│ FAQ store  │
//! │ Graph/fs │   │  pair + HTML │   │  (Gemini) │   │ + ledger   │
//! └──────────┘   └──────────────┘   └───────────┘   └─────┬──────┘
//!                                                         │ vectorize
//!                                                         ▼
//!                                     ┌──────────┐   ┌────────────┐
//!                                     │ CLI/HTTP │◀──│ Vector idx │
//!                                     │  search  │   │ local/Pcone│
//!                                     └──────────┘   └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! faqh extract                 # one extraction tick
//! faqh run                     # tick every schedule.interval_secs
//! faqh vectorize               # push new FAQ records to the index
//! faqh search "reset password"
//! faqh serve                   # JSON API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Messages, candidate pairs, FAQ records |
//! | [`sanitize`] | HTML → plain text |
//! | [`conversation`] | Grouping and question/answer pair extraction |
//! | [`mail`] | Mail sources (Microsoft Graph, JSON file) |
//! | [`validator`] | LLM validation gateway (Gemini) |
//! | [`ledger`] | Persistent processed-id sets |
//! | [`store`] | Append-only FAQ record store |
//! | [`persist`] | Atomic JSON file persistence |
//! | [`pipeline`] | Extraction tick and scheduler |
//! | [`embedding`] | Embedding providers for the local index |
//! | [`vector`] | Vector gateway trait and local index |
//! | [`pinecone`] | Pinecone vector gateway |
//! | [`vectorize`] | Batched, ledgered vectorization pass |
//! | [`search`] | CLI similarity search |
//! | [`stats`] | State counts and FAQ listing |
//! | [`server`] | JSON HTTP API |
//! | [`error`] | Pipeline error kinds |

pub mod config;
pub mod conversation;
pub mod embedding;
pub mod error;
pub mod ledger;
pub mod mail;
pub mod models;
pub mod persist;
pub mod pinecone;
pub mod pipeline;
pub mod sanitize;
pub mod search;
pub mod server;
pub mod stats;
pub mod store;
pub mod validator;
pub mod vector;
pub mod vectorize;
