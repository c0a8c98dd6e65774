//! Cross-session memory: facts and preferences that outlive a conversation.
//!
//! Entries are keyed by `(user, memory_type, memory_key)`. A secondary index
//! maps each entry id back to that composite key so [`CrossSessionMemoryStore::touch`]
//! can address entries by id. Expired entries are invisible to retrieval at
//! once and physically removed by [`CrossSessionMemoryStore::reap`].

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use super::types::{merge_payload, CrossSessionMemoryEntry, Payload};
use super::{decode, encode, is_valid_type_tag, load, modify, validate_id};
use crate::error::{MemoryError, MemoryResult};
use crate::storage::{composite_key, key_prefix, Storage, Table};

pub struct CrossSessionMemoryStore {
    storage: Arc<dyn Storage>,
}

impl CrossSessionMemoryStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Insert an entry, or merge `data` into the existing one and overwrite
    /// its importance and expiry. An existing entry that has already expired
    /// is replaced outright and its access count restarts at zero.
    pub fn upsert(
        &self,
        user_id: &str,
        memory_type: &str,
        memory_key: &str,
        data: &Payload,
        importance: f64,
        expires_at: Option<DateTime<Utc>>,
    ) -> MemoryResult<CrossSessionMemoryEntry> {
        validate_id("user id", user_id)?;
        if !is_valid_type_tag(memory_type) {
            return Err(MemoryError::InvalidMemoryType(memory_type.to_string()));
        }
        validate_id("memory key", memory_key)?;

        let importance = clamp_importance(importance);
        let key = composite_key(&[user_id, memory_type, memory_key]);

        loop {
            let now = Utc::now();
            let updated = modify(
                self.storage.as_ref(),
                Table::Memories,
                &key,
                |entry: &mut CrossSessionMemoryEntry| {
                    if entry.is_expired(now) {
                        entry.data = Payload::new();
                        entry.access_count = 0;
                        entry.created_at = now;
                        entry.last_accessed_at = now;
                    }
                    merge_payload(&mut entry.data, data);
                    entry.importance_score = importance;
                    entry.expires_at = expires_at;
                    Ok(true)
                },
            )?;
            if let Some(entry) = updated {
                tracing::debug!(user_id, memory_type, memory_key, "memory entry merged");
                return Ok(entry);
            }

            let mut fresh_data = Payload::new();
            merge_payload(&mut fresh_data, data);
            let entry = CrossSessionMemoryEntry {
                id: Uuid::now_v7().to_string(),
                user_id: user_id.to_string(),
                memory_type: memory_type.to_string(),
                memory_key: memory_key.to_string(),
                data: fresh_data,
                importance_score: importance,
                access_count: 0,
                created_at: now,
                last_accessed_at: now,
                expires_at,
            };

            // Index first: a dangling index entry resolves to nothing, a
            // missing one would make the entry untouchable.
            self.storage
                .put_if_absent(Table::MemoryIds, &entry.id, &Value::String(key.clone()))?;
            if self
                .storage
                .put_if_absent(Table::Memories, &key, &encode(&entry)?)?
            {
                tracing::debug!(user_id, memory_type, memory_key, id = %entry.id, "memory entry created");
                return Ok(entry);
            }

            // Lost the creation race; merge into the winner instead.
            self.storage.delete(Table::MemoryIds, &entry.id)?;
        }
    }

    /// Non-expired entries of `user_id` whose key or serialized data contains
    /// `context` (case-insensitive), best first: importance, then access count,
    /// then most recent access. Retrieval does not count as access.
    pub fn retrieve(
        &self,
        user_id: &str,
        context: &str,
        limit: usize,
    ) -> MemoryResult<Vec<CrossSessionMemoryEntry>> {
        let now = Utc::now();
        let needle = context.to_lowercase();

        let mut hits: Vec<CrossSessionMemoryEntry> = self
            .list_for_user(user_id)?
            .into_iter()
            .filter(|entry| !entry.is_expired(now) && mentions(entry, &needle))
            .collect();

        hits.sort_by(|a, b| {
            b.importance_score
                .total_cmp(&a.importance_score)
                .then(b.access_count.cmp(&a.access_count))
                .then(b.last_accessed_at.cmp(&a.last_accessed_at))
        });
        hits.truncate(limit);

        tracing::debug!(user_id, context, hits = hits.len(), "memories retrieved");
        Ok(hits)
    }

    /// Record that the caller used an entry. `None` if the id is unknown or
    /// the entry has expired.
    pub fn touch(&self, entry_id: &str) -> MemoryResult<Option<CrossSessionMemoryEntry>> {
        let Some(key) = self.key_for_id(entry_id)? else {
            tracing::warn!(entry_id, "touch on unknown memory id");
            return Ok(None);
        };

        let now = Utc::now();
        let mut live = true;
        let entry = modify(
            self.storage.as_ref(),
            Table::Memories,
            &key,
            |entry: &mut CrossSessionMemoryEntry| {
                live = entry.id == entry_id && !entry.is_expired(now);
                if !live {
                    return Ok(false);
                }
                entry.access_count += 1;
                entry.last_accessed_at = now;
                Ok(true)
            },
        )?;

        Ok(entry.filter(|_| live))
    }

    /// Look up an entry by id, expired or not.
    pub fn get(&self, entry_id: &str) -> MemoryResult<Option<CrossSessionMemoryEntry>> {
        let Some(key) = self.key_for_id(entry_id)? else {
            return Ok(None);
        };
        let entry: Option<CrossSessionMemoryEntry> =
            load(self.storage.as_ref(), Table::Memories, &key)?;
        Ok(entry.filter(|e| e.id == entry_id))
    }

    /// Every stored entry of a user, including expired ones, in key order.
    pub fn list_for_user(&self, user_id: &str) -> MemoryResult<Vec<CrossSessionMemoryEntry>> {
        validate_id("user id", user_id)?;
        self.storage
            .scan_prefix(Table::Memories, &key_prefix(&[user_id]))?
            .into_iter()
            .map(|(_, record)| decode(record.value))
            .collect()
    }

    /// Entries a reap at `now` would delete.
    pub fn expired_candidates(&self, now: DateTime<Utc>) -> MemoryResult<Vec<CrossSessionMemoryEntry>> {
        let mut expired = Vec::new();
        for (_, record) in self.storage.scan_prefix(Table::Memories, "")? {
            let entry: CrossSessionMemoryEntry = decode(record.value)?;
            if entry.is_expired(now) {
                expired.push(entry);
            }
        }
        expired.sort_by_key(|e| e.expires_at);
        Ok(expired)
    }

    /// Delete every entry expired at `now`. Each deletion is conditional on
    /// the version that was seen expired, so an entry revived by a concurrent
    /// upsert survives. Returns the number purged.
    pub fn reap(&self, now: DateTime<Utc>) -> MemoryResult<usize> {
        let mut purged = 0;
        for (key, record) in self.storage.scan_prefix(Table::Memories, "")? {
            let entry: CrossSessionMemoryEntry = decode(record.value)?;
            if !entry.is_expired(now) {
                continue;
            }
            if self
                .storage
                .delete_if_version(Table::Memories, &key, record.version)?
            {
                self.storage.delete(Table::MemoryIds, &entry.id)?;
                purged += 1;
            }
        }

        if purged > 0 {
            tracing::info!(purged, "expired memories reaped");
        }
        Ok(purged)
    }

    fn key_for_id(&self, entry_id: &str) -> MemoryResult<Option<String>> {
        Ok(self
            .storage
            .get(Table::MemoryIds, entry_id)?
            .and_then(|record| record.value.as_str().map(str::to_string)))
    }
}

fn clamp_importance(importance: f64) -> f64 {
    if importance.is_nan() {
        return 0.0;
    }
    importance.clamp(0.0, 1.0)
}

fn mentions(entry: &CrossSessionMemoryEntry, needle: &str) -> bool {
    if entry.memory_key.to_lowercase().contains(needle) {
        return true;
    }
    serde_json::to_string(&entry.data)
        .map(|s| s.to_lowercase().contains(needle))
        .unwrap_or(false)
}

/// Ordering used by insights when listing a user's strongest memories.
pub fn by_importance(a: &CrossSessionMemoryEntry, b: &CrossSessionMemoryEntry) -> Ordering {
    b.importance_score
        .total_cmp(&a.importance_score)
        .then(b.access_count.cmp(&a.access_count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;
    use chrono::Duration;
    use serde_json::json;

    fn store() -> CrossSessionMemoryStore {
        CrossSessionMemoryStore::new(Arc::new(InMemoryStorage::new()))
    }

    fn payload(value: Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn upsert_merges_data_and_keeps_id() {
        let store = store();
        let first = store
            .upsert("u1", "fact", "k1", &payload(json!({"a": 1})), 0.4, None)
            .unwrap();
        let second = store
            .upsert("u1", "fact", "k1", &payload(json!({"b": 2})), 0.9, None)
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(Value::Object(second.data), json!({"a": 1, "b": 2}));
        assert_eq!(second.importance_score, 0.9);
        assert_eq!(store.list_for_user("u1").unwrap().len(), 1);
    }

    #[test]
    fn upsert_validates_and_clamps() {
        let store = store();
        let err = store
            .upsert("u1", "", "k", &Payload::new(), 0.5, None)
            .unwrap_err();
        assert!(matches!(err, MemoryError::InvalidMemoryType(_)));
        let err = store
            .upsert("u1", "fact", "", &Payload::new(), 0.5, None)
            .unwrap_err();
        assert!(matches!(err, MemoryError::InvalidId { .. }));

        let entry = store
            .upsert("u1", "fact", "k", &Payload::new(), 7.0, None)
            .unwrap();
        assert_eq!(entry.importance_score, 1.0);
    }

    #[test]
    fn retrieve_filters_case_insensitively_and_ranks() {
        let store = store();
        store
            .upsert("u1", "fact", "Budget", &payload(json!({"note": "low"})), 0.5, None)
            .unwrap();
        store
            .upsert("u1", "fact", "other", &payload(json!({"note": "about budget caps"})), 0.9, None)
            .unwrap();
        store
            .upsert("u1", "fact", "unrelated", &payload(json!({"note": "audience"})), 1.0, None)
            .unwrap();
        store
            .upsert("u2", "fact", "budget", &Payload::new(), 1.0, None)
            .unwrap();

        let keys: Vec<String> = store
            .retrieve("u1", "BUDGET", 10)
            .unwrap()
            .into_iter()
            .map(|e| e.memory_key)
            .collect();
        assert_eq!(keys, vec!["other", "Budget"]);
        assert_eq!(store.retrieve("u1", "budget", 1).unwrap().len(), 1);
    }

    #[test]
    fn access_count_breaks_importance_ties() {
        let store = store();
        store.upsert("u1", "fact", "a-topic", &Payload::new(), 0.5, None).unwrap();
        let b = store.upsert("u1", "fact", "b-topic", &Payload::new(), 0.5, None).unwrap();
        store.touch(&b.id).unwrap();

        let hits = store.retrieve("u1", "topic", 10).unwrap();
        assert_eq!(hits[0].memory_key, "b-topic");
        assert_eq!(hits[0].access_count, 1);
    }

    #[test]
    fn retrieval_does_not_count_as_access() {
        let store = store();
        let entry = store.upsert("u1", "fact", "k", &Payload::new(), 0.5, None).unwrap();
        store.retrieve("u1", "k", 10).unwrap();
        assert_eq!(store.get(&entry.id).unwrap().unwrap().access_count, 0);
        assert!(store.touch("missing").unwrap().is_none());
    }

    #[test]
    fn expired_entries_are_hidden_then_reaped() {
        let store = store();
        let past = Utc::now() - Duration::seconds(1);
        let entry = store
            .upsert("u1", "fact", "k1", &payload(json!({"v": 1})), 0.9, Some(past))
            .unwrap();
        store
            .upsert("u1", "fact", "k2", &Payload::new(), 0.9, Some(Utc::now() + Duration::hours(1)))
            .unwrap();

        assert!(store.retrieve("u1", "k1", 10).unwrap().is_empty());
        assert!(store.touch(&entry.id).unwrap().is_none());
        assert_eq!(store.expired_candidates(Utc::now()).unwrap().len(), 1);

        assert_eq!(store.reap(Utc::now()).unwrap(), 1);
        assert!(store.get(&entry.id).unwrap().is_none());
        assert_eq!(store.list_for_user("u1").unwrap().len(), 1);
        assert_eq!(store.reap(Utc::now()).unwrap(), 0);
    }

    #[test]
    fn upsert_over_expired_entry_starts_fresh() {
        let store = store();
        let past = Utc::now() - Duration::seconds(1);
        store
            .upsert("u1", "fact", "k", &payload(json!({"old": true})), 0.9, Some(past))
            .unwrap();
        let revived = store
            .upsert("u1", "fact", "k", &payload(json!({"new": true})), 0.3, None)
            .unwrap();
        assert_eq!(Value::Object(revived.data), json!({"new": true}));
        assert_eq!(store.retrieve("u1", "k", 10).unwrap().len(), 1);
    }
}
