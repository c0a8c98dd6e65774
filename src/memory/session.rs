//! Session transcripts and their lifecycle.
//!
//! A session is Active from [`SessionStore::start`] until
//! [`SessionStore::mark_ended`]; the transition is terminal and idempotent.
//! Appends are accepted in both states. Late writes after the end are kept,
//! but they never change the finalized summary.

use std::cmp::Reverse;
use std::sync::Arc;

use chrono::Utc;

use super::summary::summarize;
use super::types::{
    CachedSummary, ContextSummary, IntentRecord, LoggedRecord, Message, Payload, Role,
    SessionTranscript,
};
use super::{decode, encode, load, modify, validate_id};
use crate::error::{MemoryError, MemoryResult};
use crate::storage::{composite_key, key_prefix, Storage, Table};

/// Outcome of [`SessionStore::mark_ended`].
#[derive(Debug, Clone)]
pub struct EndedSession {
    pub transcript: SessionTranscript,
    pub summary: ContextSummary,
    /// `true` when the cross-session fold still has to run.
    pub needs_archive: bool,
}

pub struct SessionStore {
    storage: Arc<dyn Storage>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Create a transcript. Starting an existing session for the same user
    /// returns it unchanged; a different user gets [`MemoryError::SessionConflict`].
    pub fn start(
        &self,
        session_id: &str,
        user_id: &str,
        external_account_ref: Option<&str>,
    ) -> MemoryResult<SessionTranscript> {
        validate_id("session id", session_id)?;
        validate_id("user id", user_id)?;

        let fresh = SessionTranscript::new(session_id, user_id, external_account_ref);
        let created = self
            .storage
            .put_if_absent(Table::Sessions, session_id, &encode(&fresh)?)?;

        let transcript = if created {
            fresh
        } else {
            let existing = self.get(session_id)?;
            if existing.user_id != user_id {
                return Err(MemoryError::SessionConflict {
                    session_id: session_id.to_string(),
                    owner: existing.user_id,
                });
            }
            existing
        };

        // Index write is idempotent, so a retried start repairs a missing entry.
        self.storage.put_if_absent(
            Table::UserSessions,
            &composite_key(&[user_id, session_id]),
            &serde_json::json!({}),
        )?;

        if created {
            tracing::info!(session_id, user_id, "session started");
        }
        Ok(transcript)
    }

    pub fn get(&self, session_id: &str) -> MemoryResult<SessionTranscript> {
        load(self.storage.as_ref(), Table::Sessions, session_id)?
            .ok_or_else(|| MemoryError::NoSuchSession(session_id.to_string()))
    }

    pub fn add_message(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
        metadata: Payload,
    ) -> MemoryResult<SessionTranscript> {
        let message = Message {
            role,
            content: content.to_string(),
            metadata,
            timestamp: Utc::now(),
        };
        self.append(session_id, |t| t.messages.push(message.clone()))
    }

    pub fn add_intent(&self, session_id: &str, intent: &str) -> MemoryResult<SessionTranscript> {
        let record = IntentRecord {
            intent: intent.to_string(),
            timestamp: Utc::now(),
        };
        self.append(session_id, |t| t.intents.push(record.clone()))
    }

    pub fn add_analysis_result(
        &self,
        session_id: &str,
        data: Payload,
    ) -> MemoryResult<SessionTranscript> {
        let record = LoggedRecord {
            data,
            timestamp: Utc::now(),
        };
        self.append(session_id, |t| t.analysis_results.push(record.clone()))
    }

    pub fn add_creative_generation(
        &self,
        session_id: &str,
        data: Payload,
    ) -> MemoryResult<SessionTranscript> {
        let record = LoggedRecord {
            data,
            timestamp: Utc::now(),
        };
        self.append(session_id, |t| t.creative_generations.push(record.clone()))
    }

    /// The transcript's summary, memoized on the record. A cached summary is
    /// reused while the transcript has not grown; a finalized one always is.
    pub fn context_summary(&self, session_id: &str) -> MemoryResult<ContextSummary> {
        let transcript = modify(
            self.storage.as_ref(),
            Table::Sessions,
            session_id,
            |t: &mut SessionTranscript| Ok(refresh_summary(t, false)),
        )?
        .ok_or_else(|| MemoryError::NoSuchSession(session_id.to_string()))?;

        Ok(cached(&transcript))
    }

    /// Flip the session to ended and finalize its summary.
    ///
    /// Safe to call repeatedly: an ended and archived session is returned
    /// untouched with `needs_archive == false`.
    pub fn mark_ended(&self, session_id: &str) -> MemoryResult<EndedSession> {
        let transcript = modify(
            self.storage.as_ref(),
            Table::Sessions,
            session_id,
            |t: &mut SessionTranscript| {
                if !t.is_active {
                    return Ok(false);
                }
                let now = Utc::now();
                t.is_active = false;
                t.ended_at = Some(now);
                t.updated_at = now;
                refresh_summary(t, true);
                Ok(true)
            },
        )?
        .ok_or_else(|| MemoryError::NoSuchSession(session_id.to_string()))?;

        Ok(EndedSession {
            summary: cached(&transcript),
            needs_archive: !transcript.archived,
            transcript,
        })
    }

    /// Record that the end-of-session fold completed.
    pub fn mark_archived(&self, session_id: &str) -> MemoryResult<()> {
        modify(
            self.storage.as_ref(),
            Table::Sessions,
            session_id,
            |t: &mut SessionTranscript| {
                if t.archived {
                    return Ok(false);
                }
                t.archived = true;
                Ok(true)
            },
        )?
        .ok_or_else(|| MemoryError::NoSuchSession(session_id.to_string()))?;
        Ok(())
    }

    /// All transcripts of a user, in session-id order.
    pub fn list_for_user(&self, user_id: &str) -> MemoryResult<Vec<SessionTranscript>> {
        validate_id("user id", user_id)?;
        let index = self
            .storage
            .scan_prefix(Table::UserSessions, &key_prefix(&[user_id]))?;

        let mut sessions = Vec::with_capacity(index.len());
        for (key, _) in index {
            let session_id = &key[user_id.len() + 1..];
            match self.storage.get(Table::Sessions, session_id)? {
                Some(record) => sessions.push(decode(record.value)?),
                None => tracing::warn!(user_id, session_id, "session index points at a missing transcript"),
            }
        }
        Ok(sessions)
    }

    /// Other ended sessions of the same user ranked by topic overlap with this
    /// one. Sessions sharing no topic are left out; ties go to the most
    /// recently ended.
    pub fn similar_sessions(
        &self,
        session_id: &str,
        limit: usize,
    ) -> MemoryResult<Vec<SessionTranscript>> {
        let topics = self.context_summary(session_id)?.topics_discussed;
        let this = self.get(session_id)?;
        if topics.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, SessionTranscript)> = self
            .list_for_user(&this.user_id)?
            .into_iter()
            .filter(|other| other.session_id != this.session_id && !other.is_active)
            .filter_map(|other| {
                let other_topics = match &other.context_summary {
                    Some(cached) => cached.summary.topics_discussed.clone(),
                    None => summarize(&other).topics_discussed,
                };
                let overlap = topics.intersection(&other_topics).count();
                (overlap > 0).then_some((overlap, other))
            })
            .collect();

        scored.sort_by_key(|(overlap, other)| {
            (
                Reverse(*overlap),
                Reverse(other.ended_at.unwrap_or(other.updated_at)),
            )
        });
        Ok(scored.into_iter().take(limit).map(|(_, s)| s).collect())
    }

    fn append<F>(&self, session_id: &str, mut push: F) -> MemoryResult<SessionTranscript>
    where
        F: FnMut(&mut SessionTranscript),
    {
        modify(
            self.storage.as_ref(),
            Table::Sessions,
            session_id,
            |t: &mut SessionTranscript| {
                push(t);
                t.updated_at = Utc::now();
                Ok(true)
            },
        )?
        .ok_or_else(|| MemoryError::NoSuchSession(session_id.to_string()))
    }
}

/// Recompute the cached summary if it is missing or stale. Returns whether
/// the record changed.
fn refresh_summary(t: &mut SessionTranscript, finalize: bool) -> bool {
    let len = t.content_len();
    match &mut t.context_summary {
        Some(cached) if cached.finalized => false,
        Some(cached) if cached.source_len == len => {
            if finalize {
                cached.finalized = true;
            }
            finalize
        }
        _ => {
            t.context_summary = Some(CachedSummary {
                summary: summarize(t),
                source_len: len,
                finalized: finalize,
                computed_at: Utc::now(),
            });
            true
        }
    }
}

fn cached(t: &SessionTranscript) -> ContextSummary {
    t.context_summary
        .as_ref()
        .map(|c| c.summary.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;

    fn store() -> SessionStore {
        SessionStore::new(Arc::new(InMemoryStorage::new()))
    }

    fn say(store: &SessionStore, session_id: &str, text: &str) {
        store
            .add_message(session_id, Role::User, text, Payload::new())
            .unwrap();
    }

    #[test]
    fn appends_to_unknown_session_fail() {
        let store = store();
        let err = store
            .add_message("nope", Role::User, "hi", Payload::new())
            .unwrap_err();
        assert!(matches!(err, MemoryError::NoSuchSession(_)));
        assert!(matches!(
            store.add_intent("nope", "greet").unwrap_err(),
            MemoryError::NoSuchSession(_)
        ));
        assert!(matches!(
            store.context_summary("nope").unwrap_err(),
            MemoryError::NoSuchSession(_)
        ));
    }

    #[test]
    fn start_is_idempotent_and_guards_ownership() {
        let store = store();
        store.start("s1", "u1", Some("acct-9")).unwrap();
        say(&store, "s1", "hello");
        let again = store.start("s1", "u1", None).unwrap();
        assert_eq!(again.messages.len(), 1);
        assert_eq!(again.external_account_ref.as_deref(), Some("acct-9"));

        let err = store.start("s1", "u2", None).unwrap_err();
        assert!(matches!(err, MemoryError::SessionConflict { .. }));
    }

    #[test]
    fn summary_is_memoized_until_transcript_grows() {
        let store = store();
        store.start("s1", "u1", None).unwrap();
        say(&store, "s1", "How is my campaign doing?");

        store.context_summary("s1").unwrap();
        let first = store.get("s1").unwrap().context_summary.unwrap();
        store.context_summary("s1").unwrap();
        let second = store.get("s1").unwrap().context_summary.unwrap();
        assert_eq!(first.computed_at, second.computed_at);

        say(&store, "s1", "And what about the budget?");
        let summary = store.context_summary("s1").unwrap();
        assert!(summary.topics_discussed.contains("budget_optimization"));
    }

    #[test]
    fn end_is_terminal_and_late_writes_do_not_change_summary() {
        let store = store();
        store.start("s1", "u1", None).unwrap();
        say(&store, "s1", "campaign numbers please");

        let ended = store.mark_ended("s1").unwrap();
        assert!(ended.needs_archive);
        assert!(!ended.transcript.is_active);

        say(&store, "s1", "one more thing about the audience");
        let transcript = store.get("s1").unwrap();
        assert_eq!(transcript.messages.len(), 2);

        let again = store.mark_ended("s1").unwrap();
        assert_eq!(again.summary, ended.summary);
        assert_eq!(again.transcript.ended_at, ended.transcript.ended_at);
        assert!(!again.summary.topics_discussed.contains("audience_targeting"));

        store.mark_archived("s1").unwrap();
        assert!(!store.mark_ended("s1").unwrap().needs_archive);
    }

    #[test]
    fn similar_sessions_rank_by_overlap_then_recency() {
        let store = store();
        store.start("a", "u1", None).unwrap();
        say(&store, "a", "campaign budget");
        store.mark_ended("a").unwrap();

        std::thread::sleep(std::time::Duration::from_millis(2));
        store.start("b", "u1", None).unwrap();
        say(&store, "b", "campaign only");
        store.mark_ended("b").unwrap();

        std::thread::sleep(std::time::Duration::from_millis(2));
        store.start("c", "u1", None).unwrap();
        say(&store, "c", "campaign again");
        store.mark_ended("c").unwrap();

        store.start("d", "u1", None).unwrap();
        say(&store, "d", "unrelated chit-chat");
        store.mark_ended("d").unwrap();

        // Active sessions and other users are never candidates.
        store.start("live", "u1", None).unwrap();
        say(&store, "live", "campaign budget");
        store.start("other", "u2", None).unwrap();
        say(&store, "other", "campaign budget");
        store.mark_ended("other").unwrap();

        store.start("probe", "u1", None).unwrap();
        say(&store, "probe", "campaign budget review");

        let ids: Vec<String> = store
            .similar_sessions("probe", 10)
            .unwrap()
            .into_iter()
            .map(|s| s.session_id)
            .collect();
        assert_eq!(ids, vec!["a", "c", "b"]);

        let top: Vec<String> = store
            .similar_sessions("probe", 1)
            .unwrap()
            .into_iter()
            .map(|s| s.session_id)
            .collect();
        assert_eq!(top, vec!["a"]);
    }
}
