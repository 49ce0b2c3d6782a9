//! Authoritative in-memory spaced-repetition card store with append-only
//! SQLite journaling.
//!
//! Cards climb a nine-level ladder (0 through 8) as recall outcomes come
//! in; each level buys a longer wait before the card is due again, a miss
//! drops the card back to level 1 and makes it due immediately, and level
//! 8 marks it mastered. Every mutation is journaled as an op so a store
//! can be rebuilt by replay, including its activity and audit trails.
//!
//! # Examples
//!
//! In-memory usage with [`core::store::CardStore`]:
//! ```
//! use cardlog::{card::CardDraft, core::store::CardStore};
//! use chrono::Utc;
//!
//! let mut store = CardStore::new();
//! let (id, _op) = store.insert(CardDraft {
//!     box_id: 1,
//!     user_id: 1,
//!     group_id: "lesson-1".to_string(),
//!     config: serde_json::json!({"front": "hola", "back": "hello"}),
//! }, Utc::now()).expect("insert");
//! assert_eq!(id, 1);
//!
//! let (outcome, _op) = store.activate(1, 1, 1, Utc::now()).expect("activate");
//! assert_eq!(outcome.activated, 1);
//!
//! let (reviewed, _op) = store.review(id, 1, true, Utc::now()).expect("review");
//! assert_eq!(reviewed.card.level, 2);
//! ```
//!
//! Runtime usage with SQLite sink:
//! ```no_run
//! use cardlog::{
//!     card::CardDraft,
//!     core::store::CardStore,
//!     persist::sqlite::SqliteOpSink,
//!     runtime::handle::{RuntimeConfig, spawn_cardlog},
//!     sched::Outcome,
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let sink = SqliteOpSink::open("cardlog.db").expect("open sqlite");
//! let handle = spawn_cardlog(CardStore::new(), Some(Box::new(sink)), RuntimeConfig::default());
//! let id = handle.insert(CardDraft {
//!     box_id: 1,
//!     user_id: 1,
//!     group_id: "lesson-1".to_string(),
//!     config: serde_json::json!({"front": "hola"}),
//! }).await.expect("insert");
//! handle.activate(1, 1, 1).await.expect("activate");
//! handle.review(id, 1, Outcome::Correct).await.expect("review");
//! handle.shutdown().await.expect("shutdown");
//! # }
//! ```
#![deny(missing_docs)]

/// Card domain records, drafts, patches, and snapshots.
pub mod card;
/// Core in-memory store and index helpers.
pub mod core;
/// Mutation op model and persistence wrapper types.
pub mod op;
/// Persistence abstraction and SQLite implementation.
pub mod persist;
/// Calendar-bucketed activity aggregation.
pub mod report;
/// Single-writer runtime handle and events.
pub mod runtime;
/// Review transitions and recall-outcome parsing.
pub mod sched;
/// Activity and audit trail records.
pub mod trail;
/// Shared primitive types and enums.
pub mod types;
