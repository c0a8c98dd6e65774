use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::cross_session::by_importance;
use super::decode;
use super::manager::MemoryManager;
use super::types::{CrossSessionMemoryEntry, ExpertiseLevel, Payload};
use crate::error::MemoryResult;
use crate::storage::{Storage, Table};

/// How many memories [`UserInsights::top_memories`] lists.
const TOP_MEMORIES: usize = 5;

/// Digest of everything the engine knows about one user.
#[derive(Debug, Serialize)]
pub struct UserInsights {
    pub user_id: String,
    pub expertise_level: ExpertiseLevel,
    pub preferred_analysis_depth: u32,
    pub favorite_topics: Vec<String>,
    pub preferences: Payload,
    /// Pattern type → number of retained observations.
    pub observations: BTreeMap<String, usize>,
    pub total_sessions: usize,
    pub active_sessions: usize,
    pub memories_by_type: BTreeMap<String, usize>,
    /// Entries already expired but not yet reaped.
    pub pending_expiry: usize,
    pub top_memories: Vec<MemoryDigest>,
    pub patterns: Vec<PatternDigest>,
}

#[derive(Debug, Serialize)]
pub struct MemoryDigest {
    pub id: String,
    pub memory_type: String,
    pub memory_key: String,
    pub importance_score: f64,
    pub access_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct PatternDigest {
    pub pattern_type: String,
    pub success_rate: f64,
    pub usage_count: u64,
    pub trusted: bool,
    pub score: f64,
}

/// Whole-store counts.
#[derive(Debug, Serialize)]
pub struct StoreStats {
    pub users: usize,
    pub sessions: usize,
    pub active_sessions: usize,
    pub memories: usize,
    pub expired_memories: usize,
    pub patterns: usize,
}

impl From<&CrossSessionMemoryEntry> for MemoryDigest {
    fn from(entry: &CrossSessionMemoryEntry) -> Self {
        Self {
            id: entry.id.clone(),
            memory_type: entry.memory_type.clone(),
            memory_key: entry.memory_key.clone(),
            importance_score: entry.importance_score,
            access_count: entry.access_count,
            expires_at: entry.expires_at,
        }
    }
}

/// Fails with `NoSuchUser` for a user that has never been seen.
pub fn user_insights(
    manager: &MemoryManager,
    user_id: &str,
    now: DateTime<Utc>,
) -> MemoryResult<UserInsights> {
    let profile = manager.profiles().get(user_id)?;
    let sessions = manager.sessions().list_for_user(user_id)?;
    let mut memories = manager.memories().list_for_user(user_id)?;

    let mut memories_by_type = BTreeMap::new();
    for entry in &memories {
        *memories_by_type.entry(entry.memory_type.clone()).or_insert(0) += 1;
    }
    let pending_expiry = memories.iter().filter(|e| e.is_expired(now)).count();

    memories.retain(|e| !e.is_expired(now));
    memories.sort_by(by_importance);
    let top_memories = memories.iter().take(TOP_MEMORIES).map(MemoryDigest::from).collect();

    let patterns = manager
        .patterns()
        .ranked(user_id)?
        .into_iter()
        .map(|r| PatternDigest {
            pattern_type: r.pattern.pattern_type,
            success_rate: r.pattern.success_rate,
            usage_count: r.pattern.usage_count,
            trusted: r.trusted,
            score: r.score,
        })
        .collect();

    Ok(UserInsights {
        user_id: profile.user_id,
        expertise_level: profile.expertise_level,
        preferred_analysis_depth: profile.preferred_analysis_depth,
        favorite_topics: profile.favorite_topics.into_iter().collect(),
        preferences: profile.preferences,
        observations: profile
            .learning_patterns
            .iter()
            .map(|(k, v)| (k.clone(), v.len()))
            .collect(),
        total_sessions: sessions.len(),
        active_sessions: sessions.iter().filter(|s| s.is_active).count(),
        memories_by_type,
        pending_expiry,
        top_memories,
        patterns,
    })
}

pub fn store_stats(storage: &dyn Storage, now: DateTime<Utc>) -> MemoryResult<StoreStats> {
    let sessions = storage.scan_prefix(Table::Sessions, "")?;
    let active_sessions = sessions
        .iter()
        .filter(|(_, r)| r.value.get("is_active").and_then(Value::as_bool) == Some(true))
        .count();

    let mut memories = 0;
    let mut expired_memories = 0;
    for (_, record) in storage.scan_prefix(Table::Memories, "")? {
        let entry: CrossSessionMemoryEntry = decode(record.value)?;
        memories += 1;
        if entry.is_expired(now) {
            expired_memories += 1;
        }
    }

    Ok(StoreStats {
        users: storage.count(Table::Profiles)?,
        sessions: sessions.len(),
        active_sessions,
        memories,
        expired_memories,
        patterns: storage.count(Table::Patterns)?,
    })
}
