//! Adaptive memory for conversational assistants: persistent, personalized
//! memory across turns and across independent sessions.
//!
//! Recollect lets an assistant recall what happened earlier in a conversation,
//! recall facts and preferences learned in unrelated earlier sessions, and pick
//! a response strategy that has empirically worked for this user before. It
//! keeps four kinds of records:
//!
//! | Record | Keyed by | Lifetime |
//! |--------|----------|----------|
//! | **UserProfile** | user | Account lifetime; merged, never replaced |
//! | **SessionTranscript** | session | Active until ended; never deleted |
//! | **CrossSessionMemoryEntry** | user, type, key | Until its optional expiry, then reaped |
//! | **AdaptiveResponsePattern** | user, pattern type | Trusted once its success rate is earned |
//!
//! # Architecture
//!
//! - **Storage**: a [`storage::Storage`] trait of versioned JSON records, with
//!   SQLite (pooled, WAL) and in-memory backends
//! - **Concurrency**: per-record optimistic versioning; no process-wide lock
//! - **Retrieval**: case-insensitive substring relevance ranked by importance,
//!   then access count
//! - **Selection**: subset-match on trigger conditions, gated on success rate
//!   and evidence volume
//!
//! # Modules
//!
//! - [`config`] — Configuration loading from TOML files and environment variables
//! - [`db`] — SQLite pool, schema, migrations, and health checks
//! - [`error`] — Typed engine errors
//! - [`memory`] — Stores, summarizer, archiver, pattern selector, facade, and reaper
//! - [`storage`] — The record store abstraction and its backends

pub mod config;
pub mod db;
pub mod error;
pub mod memory;
pub mod storage;

pub use error::{MemoryError, MemoryResult};
pub use memory::manager::MemoryManager;
