//! Core record definitions.
//!
//! Defines [`UserProfile`], [`SessionTranscript`] with its derived
//! [`ContextSummary`], [`CrossSessionMemoryEntry`], and
//! [`AdaptiveResponsePattern`], plus the schema-less [`Payload`] they carry.
//! Every record is stored as JSON through [`crate::storage::Storage`].

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Open structured value used for preferences, message metadata, memory data,
/// trigger conditions, and response templates.
pub type Payload = serde_json::Map<String, Value>;

/// Merge `patch` into `target` key by key. A `null` in the patch clears the key.
pub fn merge_payload(target: &mut Payload, patch: &Payload) {
    for (key, value) in patch {
        if value.is_null() {
            target.remove(key);
        } else {
            target.insert(key.clone(), value.clone());
        }
    }
}

/// `true` iff every key of `conditions` is present in `context` with an equal value.
pub fn subset_match(conditions: &Payload, context: &Payload) -> bool {
    conditions
        .iter()
        .all(|(key, expected)| context.get(key) == Some(expected))
}

/// How experienced the user is with the domain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpertiseLevel {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
    Expert,
}

impl ExpertiseLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
            Self::Expert => "expert",
        }
    }
}

impl std::fmt::Display for ExpertiseLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExpertiseLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "beginner" => Ok(Self::Beginner),
            "intermediate" => Ok(Self::Intermediate),
            "advanced" => Ok(Self::Advanced),
            "expert" => Ok(Self::Expert),
            _ => Err(format!("unknown expertise level: {s}")),
        }
    }
}

/// One learned observation for a pattern type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub data: Payload,
    pub timestamp: DateTime<Utc>,
    pub confidence: f64,
}

/// Long-lived per-user profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub expertise_level: ExpertiseLevel,
    pub preferences: Payload,
    pub favorite_topics: BTreeSet<String>,
    pub preferred_analysis_depth: u32,
    /// Pattern type → observations, oldest first.
    pub learning_patterns: BTreeMap<String, Vec<Observation>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Analysis depth a fresh profile starts from; "summary" cues pull it toward
/// [`DEPTH_SUMMARY`], "detailed" cues toward [`DEPTH_DETAILED`].
pub const DEFAULT_ANALYSIS_DEPTH: u32 = 2;
pub const DEPTH_SUMMARY: u32 = 1;
pub const DEPTH_DETAILED: u32 = 3;

impl UserProfile {
    pub fn new(user_id: &str) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.to_string(),
            expertise_level: ExpertiseLevel::default(),
            preferences: Payload::new(),
            favorite_topics: BTreeSet::new(),
            preferred_analysis_depth: DEFAULT_ANALYSIS_DEPTH,
            learning_patterns: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Who authored a transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub metadata: Payload,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentRecord {
    pub intent: String,
    pub timestamp: DateTime<Utc>,
}

/// Opaque analysis result or creative generation, as logged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedRecord {
    pub data: Payload,
    pub timestamp: DateTime<Utc>,
}

/// Derived digest of a transcript. Only the session store writes it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextSummary {
    pub topics_discussed: BTreeSet<String>,
    pub user_preferences: Payload,
    pub analysis_focus: Payload,
    pub creative_style: Payload,
}

/// A memoized summary and the transcript length it was computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedSummary {
    pub summary: ContextSummary,
    /// Total appended items (messages, intents, analyses, generations) seen.
    pub source_len: usize,
    /// Set at session end; a final summary is never recomputed.
    pub finalized: bool,
    pub computed_at: DateTime<Utc>,
}

/// One conversation. Created at session start, never physically deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionTranscript {
    pub session_id: String,
    pub user_id: String,
    pub external_account_ref: Option<String>,
    pub messages: Vec<Message>,
    pub intents: Vec<IntentRecord>,
    pub analysis_results: Vec<LoggedRecord>,
    pub creative_generations: Vec<LoggedRecord>,
    pub context_summary: Option<CachedSummary>,
    pub is_active: bool,
    /// Whether the end-of-session fold into cross-session memory completed.
    #[serde(default)]
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl SessionTranscript {
    pub fn new(session_id: &str, user_id: &str, external_account_ref: Option<&str>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            external_account_ref: external_account_ref.map(str::to_string),
            messages: Vec::new(),
            intents: Vec::new(),
            analysis_results: Vec::new(),
            creative_generations: Vec::new(),
            context_summary: None,
            is_active: true,
            archived: false,
            created_at: now,
            updated_at: now,
            ended_at: None,
        }
    }

    /// Number of appended items across all logs.
    pub fn content_len(&self) -> usize {
        self.messages.len()
            + self.intents.len()
            + self.analysis_results.len()
            + self.creative_generations.len()
    }

    /// Bodies of user-authored messages, in order.
    pub fn user_messages(&self) -> impl Iterator<Item = &str> {
        self.messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

/// A fact or preference that outlives a single conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossSessionMemoryEntry {
    /// UUID v7 (time-sortable).
    pub id: String,
    pub user_id: String,
    pub memory_type: String,
    pub memory_key: String,
    pub data: Payload,
    /// In `[0.0, 1.0]`.
    pub importance_score: f64,
    pub access_count: u64,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    /// `None` means the entry never expires.
    pub expires_at: Option<DateTime<Utc>>,
}

impl CrossSessionMemoryEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// A condition-triggered response template whose trust is earned over time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveResponsePattern {
    pub user_id: String,
    pub pattern_type: String,
    pub trigger_conditions: Payload,
    pub response_template: Payload,
    /// Always `success_count / usage_count` (0 when unused).
    pub success_rate: f64,
    pub usage_count: u64,
    pub success_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
