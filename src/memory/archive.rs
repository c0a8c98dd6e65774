//! Folds a finished session into cross-session memory.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use super::cross_session::CrossSessionMemoryStore;
use super::types::{ContextSummary, Payload, SessionTranscript};
use crate::config::LearningConfig;
use crate::error::MemoryResult;

/// Memory type for one entry per discussed topic.
pub const TOPIC_EXPERTISE: &str = "topic_expertise";
/// Memory type holding the user's latest observed preferences.
pub const USER_PREFERENCES: &str = "user_preferences";
pub const CURRENT_PREFERENCES_KEY: &str = "current_preferences";

pub struct CrossSessionArchiver {
    memories: Arc<CrossSessionMemoryStore>,
    config: LearningConfig,
}

impl CrossSessionArchiver {
    pub fn new(memories: Arc<CrossSessionMemoryStore>, config: LearningConfig) -> Self {
        Self { memories, config }
    }

    /// Upsert one `topic_expertise` entry per topic and, when any preference
    /// was observed, the `user_preferences/current_preferences` entry.
    /// Returns how many entries were written. Upserts are keyed, so running
    /// the fold twice never duplicates anything.
    pub fn fold(
        &self,
        transcript: &SessionTranscript,
        summary: &ContextSummary,
    ) -> MemoryResult<usize> {
        let user_id = transcript.user_id.as_str();
        let discussed_at = transcript.ended_at.unwrap_or(transcript.updated_at);
        let expires_at = self.expiry(discussed_at);
        let mut written = 0;

        for topic in &summary.topics_discussed {
            let mut data = Payload::new();
            data.insert("topic".into(), Value::from(topic.as_str()));
            data.insert("last_session".into(), Value::from(transcript.session_id.as_str()));
            data.insert("last_discussed_at".into(), Value::from(discussed_at.to_rfc3339()));

            self.memories.upsert(
                user_id,
                TOPIC_EXPERTISE,
                topic,
                &data,
                self.config.topic_importance,
                expires_at,
            )?;
            written += 1;
        }

        if !summary.user_preferences.is_empty() {
            self.memories.upsert(
                user_id,
                USER_PREFERENCES,
                CURRENT_PREFERENCES_KEY,
                &summary.user_preferences,
                self.config.preference_importance,
                expires_at,
            )?;
            written += 1;
        }

        tracing::info!(
            user_id,
            session_id = %transcript.session_id,
            written,
            "session folded into cross-session memory"
        );
        Ok(written)
    }

    fn expiry(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.config
            .archive_ttl_days
            .and_then(|days| i64::try_from(days).ok())
            .and_then(Duration::try_days)
            .map(|ttl| from + ttl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::summary::summarize;
    use crate::memory::types::{Message, Role};
    use crate::storage::InMemoryStorage;

    fn setup(ttl: Option<u64>) -> (Arc<CrossSessionMemoryStore>, CrossSessionArchiver) {
        let memories = Arc::new(CrossSessionMemoryStore::new(Arc::new(InMemoryStorage::new())));
        let config = LearningConfig {
            archive_ttl_days: ttl,
            ..LearningConfig::default()
        };
        let archiver = CrossSessionArchiver::new(memories.clone(), config);
        (memories, archiver)
    }

    fn transcript(text: &str) -> SessionTranscript {
        let mut t = SessionTranscript::new("s1", "u1", None);
        t.messages.push(Message {
            role: Role::User,
            content: text.to_string(),
            metadata: Payload::new(),
            timestamp: Utc::now(),
        });
        t.ended_at = Some(Utc::now());
        t
    }

    #[test]
    fn topics_and_preferences_are_folded() {
        let (memories, archiver) = setup(None);
        let t = transcript("Show me a detailed campaign report");
        let written = archiver.fold(&t, &summarize(&t)).unwrap();
        assert_eq!(written, 3);

        let entries = memories.list_for_user("u1").unwrap();
        let topic = entries
            .iter()
            .find(|e| e.memory_type == TOPIC_EXPERTISE && e.memory_key == "campaign_management")
            .unwrap();
        assert_eq!(topic.importance_score, 0.7);
        assert_eq!(topic.data["last_session"], "s1");
        assert!(topic.expires_at.is_none());

        let prefs = entries
            .iter()
            .find(|e| e.memory_type == USER_PREFERENCES)
            .unwrap();
        assert_eq!(prefs.memory_key, CURRENT_PREFERENCES_KEY);
        assert_eq!(prefs.importance_score, 0.8);
        assert_eq!(prefs.data["depth"], "detailed");
    }

    #[test]
    fn empty_preferences_are_not_folded() {
        let (memories, archiver) = setup(None);
        let t = transcript("budget question");
        assert_eq!(archiver.fold(&t, &summarize(&t)).unwrap(), 1);
        assert!(memories
            .list_for_user("u1")
            .unwrap()
            .iter()
            .all(|e| e.memory_type == TOPIC_EXPERTISE));
    }

    #[test]
    fn ttl_sets_expiry() {
        let (memories, archiver) = setup(Some(30));
        let t = transcript("budget question");
        archiver.fold(&t, &summarize(&t)).unwrap();
        let entry = &memories.list_for_user("u1").unwrap()[0];
        assert!(entry.expires_at.unwrap() > Utc::now() + Duration::days(29));
    }
}
