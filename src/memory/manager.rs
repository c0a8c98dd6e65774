//! The single entry point a chat layer talks to.
//!
//! [`MemoryManager`] wires the stores together over one injected
//! [`Storage`]. It keeps no state of its own; every invariant lives in the
//! store that owns the record.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::archive::CrossSessionArchiver;
use super::cross_session::CrossSessionMemoryStore;
use super::patterns::AdaptivePatternStore;
use super::profile::UserProfileStore;
use super::session::SessionStore;
use super::stats::{self, StoreStats, UserInsights};
use super::summary::{extract_preferences, extract_topics};
use super::types::{
    AdaptiveResponsePattern, ContextSummary, CrossSessionMemoryEntry, Payload, Role,
    SessionTranscript, UserProfile, DEPTH_DETAILED, DEPTH_SUMMARY,
};
use crate::config::{RecollectConfig, RetrievalConfig};
use crate::error::MemoryResult;
use crate::storage::{InMemoryStorage, SqliteStorage, Storage};

/// Learned when a user turn mentions known topics.
pub const TOPIC_INTEREST: &str = "topic_interest";
/// Learned when a user turn carries depth or format cues.
pub const PREFERENCE_SIGNAL: &str = "preference_signal";

pub struct MemoryManager {
    storage: Arc<dyn Storage>,
    profiles: UserProfileStore,
    sessions: SessionStore,
    memories: Arc<CrossSessionMemoryStore>,
    patterns: AdaptivePatternStore,
    archiver: CrossSessionArchiver,
    retrieval: RetrievalConfig,
}

impl MemoryManager {
    pub fn new(storage: Arc<dyn Storage>, config: &RecollectConfig) -> Self {
        let memories = Arc::new(CrossSessionMemoryStore::new(storage.clone()));
        Self {
            profiles: UserProfileStore::new(
                storage.clone(),
                config.learning.max_observations_per_type,
            ),
            sessions: SessionStore::new(storage.clone()),
            archiver: CrossSessionArchiver::new(memories.clone(), config.learning.clone()),
            patterns: AdaptivePatternStore::new(storage.clone(), config.patterns.clone()),
            memories,
            retrieval: config.retrieval.clone(),
            storage,
        }
    }

    /// Open the SQLite database named by the configuration.
    pub fn open(config: &RecollectConfig) -> anyhow::Result<Self> {
        let storage = SqliteStorage::open(config.resolved_db_path(), config.storage.pool_size)?;
        Ok(Self::new(Arc::new(storage), config))
    }

    /// Ephemeral engine backed by [`InMemoryStorage`].
    pub fn in_memory(config: &RecollectConfig) -> Self {
        Self::new(Arc::new(InMemoryStorage::new()), config)
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn profiles(&self) -> &UserProfileStore {
        &self.profiles
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn memories(&self) -> &CrossSessionMemoryStore {
        &self.memories
    }

    pub fn patterns(&self) -> &AdaptivePatternStore {
        &self.patterns
    }

    // ── Profiles ────────────────────────────────────────────────────────────

    pub fn get_or_create_profile(&self, user_id: &str) -> MemoryResult<UserProfile> {
        self.profiles.get_or_create(user_id)
    }

    pub fn profile(&self, user_id: &str) -> MemoryResult<UserProfile> {
        self.profiles.get(user_id)
    }

    pub fn update_preferences(&self, user_id: &str, patch: &Payload) -> MemoryResult<UserProfile> {
        self.profiles.update_preferences(user_id, patch)
    }

    pub fn set_expertise_level(&self, user_id: &str, level: &str) -> MemoryResult<UserProfile> {
        self.profiles.set_expertise_level(user_id, level)
    }

    pub fn learn_pattern(
        &self,
        user_id: &str,
        pattern_type: &str,
        data: Payload,
    ) -> MemoryResult<UserProfile> {
        self.profiles.learn_pattern(user_id, pattern_type, data)
    }

    pub fn best_adaptive_observation(
        &self,
        user_id: &str,
        pattern_type: &str,
    ) -> MemoryResult<Option<Payload>> {
        self.profiles.best_adaptive_observation(user_id, pattern_type)
    }

    // ── Session lifecycle ───────────────────────────────────────────────────

    /// Start (or resume) a session, creating the user's profile if needed.
    pub fn start_session(
        &self,
        session_id: &str,
        user_id: &str,
        external_account_ref: Option<&str>,
    ) -> MemoryResult<SessionTranscript> {
        self.profiles.get_or_create(user_id)?;
        self.sessions.start(session_id, user_id, external_account_ref)
    }

    /// Append a user message, its intent if classified, and learn from it:
    /// mentioned topics join the favorites, depth cues nudge the preferred
    /// analysis depth, and both are logged as profile observations.
    pub fn record_user_turn(
        &self,
        session_id: &str,
        content: &str,
        metadata: Payload,
        intent: Option<&str>,
    ) -> MemoryResult<SessionTranscript> {
        let mut transcript = self
            .sessions
            .add_message(session_id, Role::User, content, metadata)?;
        if let Some(intent) = intent {
            transcript = self.sessions.add_intent(session_id, intent)?;
        }

        let user_id = transcript.user_id.as_str();
        let topics = extract_topics(content);
        if !topics.is_empty() {
            self.profiles
                .add_favorite_topics(user_id, topics.iter().map(String::as_str))?;

            let mut data = Payload::new();
            data.insert("topics".into(), Value::from(topics.iter().cloned().collect::<Vec<_>>()));
            data.insert("session_id".into(), Value::from(session_id));
            self.profiles.learn_pattern(user_id, TOPIC_INTEREST, data)?;
        }

        let mut preferences = extract_preferences(content);
        if !preferences.is_empty() {
            match preferences.get("depth").and_then(Value::as_str) {
                Some("detailed") => {
                    self.profiles.nudge_analysis_depth(user_id, DEPTH_DETAILED)?;
                }
                Some("summary") => {
                    self.profiles.nudge_analysis_depth(user_id, DEPTH_SUMMARY)?;
                }
                _ => {}
            }
            preferences.insert("session_id".into(), Value::from(session_id));
            self.profiles
                .learn_pattern(user_id, PREFERENCE_SIGNAL, preferences)?;
        }

        Ok(transcript)
    }

    pub fn record_assistant_turn(
        &self,
        session_id: &str,
        content: &str,
        metadata: Payload,
    ) -> MemoryResult<SessionTranscript> {
        self.sessions
            .add_message(session_id, Role::Assistant, content, metadata)
    }

    pub fn record_intent(&self, session_id: &str, intent: &str) -> MemoryResult<SessionTranscript> {
        self.sessions.add_intent(session_id, intent)
    }

    pub fn record_analysis_result(
        &self,
        session_id: &str,
        data: Payload,
    ) -> MemoryResult<SessionTranscript> {
        self.sessions.add_analysis_result(session_id, data)
    }

    pub fn record_creative_generation(
        &self,
        session_id: &str,
        data: Payload,
    ) -> MemoryResult<SessionTranscript> {
        self.sessions.add_creative_generation(session_id, data)
    }

    pub fn session(&self, session_id: &str) -> MemoryResult<SessionTranscript> {
        self.sessions.get(session_id)
    }

    pub fn context_summary(&self, session_id: &str) -> MemoryResult<ContextSummary> {
        self.sessions.context_summary(session_id)
    }

    /// Close a session and fold its summary into cross-session memory.
    ///
    /// Retrying is always safe. A session that ended but was never archived
    /// (the process died in between) is archived on the retry; otherwise the
    /// call changes nothing and returns the same summary.
    pub fn end_session(&self, session_id: &str) -> MemoryResult<ContextSummary> {
        let ended = self.sessions.mark_ended(session_id)?;
        if ended.needs_archive {
            self.archiver.fold(&ended.transcript, &ended.summary)?;
            self.sessions.mark_archived(session_id)?;
            tracing::info!(
                session_id,
                user_id = %ended.transcript.user_id,
                topics = ended.summary.topics_discussed.len(),
                "session ended"
            );
        } else {
            tracing::debug!(session_id, "session already ended");
        }
        Ok(ended.summary)
    }

    /// Ended sessions of the same user sharing topics with this one.
    /// `limit` defaults to the configured `similar_sessions_limit`.
    pub fn similar_sessions(
        &self,
        session_id: &str,
        limit: Option<usize>,
    ) -> MemoryResult<Vec<SessionTranscript>> {
        self.sessions.similar_sessions(
            session_id,
            limit.unwrap_or(self.retrieval.similar_sessions_limit),
        )
    }

    // ── Cross-session memory ────────────────────────────────────────────────

    pub fn remember(
        &self,
        user_id: &str,
        memory_type: &str,
        memory_key: &str,
        data: &Payload,
        importance: f64,
        expires_at: Option<DateTime<Utc>>,
    ) -> MemoryResult<CrossSessionMemoryEntry> {
        self.memories
            .upsert(user_id, memory_type, memory_key, data, importance, expires_at)
    }

    /// `limit` defaults to the configured `default_limit`.
    pub fn retrieve_relevant_memories(
        &self,
        user_id: &str,
        context: &str,
        limit: Option<usize>,
    ) -> MemoryResult<Vec<CrossSessionMemoryEntry>> {
        self.memories
            .retrieve(user_id, context, limit.unwrap_or(self.retrieval.default_limit))
    }

    /// Mark a retrieved entry as actually used.
    pub fn touch_memory(&self, entry_id: &str) -> MemoryResult<Option<CrossSessionMemoryEntry>> {
        self.memories.touch(entry_id)
    }

    /// Purge expired cross-session entries now.
    pub fn cleanup_expired(&self) -> MemoryResult<usize> {
        self.memories.reap(Utc::now())
    }

    /// What [`MemoryManager::cleanup_expired`] would delete right now.
    pub fn expired_candidates(&self) -> MemoryResult<Vec<CrossSessionMemoryEntry>> {
        self.memories.expired_candidates(Utc::now())
    }

    // ── Adaptive patterns ───────────────────────────────────────────────────

    pub fn store_response_pattern(
        &self,
        user_id: &str,
        pattern_type: &str,
        trigger_conditions: &Payload,
        response_template: &Payload,
    ) -> MemoryResult<AdaptiveResponsePattern> {
        self.patterns
            .store(user_id, pattern_type, trigger_conditions, response_template)
    }

    /// The trusted pattern for this situation, if any. `None` means the
    /// caller should use its non-adaptive path.
    pub fn get_adaptive_response(
        &self,
        user_id: &str,
        pattern_type: &str,
        context: &Payload,
    ) -> MemoryResult<Option<AdaptiveResponsePattern>> {
        self.patterns.select_best(user_id, pattern_type, context)
    }

    pub fn record_pattern_outcome(
        &self,
        user_id: &str,
        pattern_type: &str,
        was_successful: bool,
    ) -> MemoryResult<Option<AdaptiveResponsePattern>> {
        self.patterns
            .record_outcome(user_id, pattern_type, was_successful)
    }

    // ── Insights ────────────────────────────────────────────────────────────

    pub fn user_insights(&self, user_id: &str) -> MemoryResult<UserInsights> {
        stats::user_insights(self, user_id, Utc::now())
    }

    pub fn store_stats(&self) -> MemoryResult<StoreStats> {
        stats::store_stats(self.storage.as_ref(), Utc::now())
    }
}
