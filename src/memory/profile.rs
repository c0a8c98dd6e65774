//! Per-user long-term profiles.
//!
//! Creation is an atomic insert-if-absent, so concurrent first access for
//! the same user yields exactly one profile. Every mutation is a versioned
//! read-modify-write on that single record.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use super::types::{ExpertiseLevel, Observation, Payload, UserProfile};
use super::{encode, is_valid_type_tag, load, modify, validate_id};
use crate::error::{MemoryError, MemoryResult};
use crate::storage::{Storage, Table};

/// Confidence recorded for an observation whose data carries none.
pub const DEFAULT_OBSERVATION_CONFIDENCE: f64 = 0.5;

pub struct UserProfileStore {
    storage: Arc<dyn Storage>,
    max_observations_per_type: usize,
}

impl UserProfileStore {
    pub fn new(storage: Arc<dyn Storage>, max_observations_per_type: usize) -> Self {
        Self {
            storage,
            max_observations_per_type: max_observations_per_type.max(1),
        }
    }

    /// Return the user's profile, creating a default one on first access.
    pub fn get_or_create(&self, user_id: &str) -> MemoryResult<UserProfile> {
        validate_id("user id", user_id)?;

        let fresh = UserProfile::new(user_id);
        if self
            .storage
            .put_if_absent(Table::Profiles, user_id, &encode(&fresh)?)?
        {
            tracing::info!(user_id, "user profile created");
            return Ok(fresh);
        }

        load(self.storage.as_ref(), Table::Profiles, user_id)?
            .ok_or_else(|| MemoryError::NoSuchUser(user_id.to_string()))
    }

    /// Fetch an existing profile without creating one.
    pub fn get(&self, user_id: &str) -> MemoryResult<UserProfile> {
        validate_id("user id", user_id)?;
        load(self.storage.as_ref(), Table::Profiles, user_id)?
            .ok_or_else(|| MemoryError::NoSuchUser(user_id.to_string()))
    }

    /// Key-wise merge of `patch` into the preferences. Unrelated keys survive.
    pub fn update_preferences(&self, user_id: &str, patch: &Payload) -> MemoryResult<UserProfile> {
        self.update(user_id, |profile| {
            super::types::merge_payload(&mut profile.preferences, patch);
            Ok(true)
        })
    }

    /// Append an observation; confidence comes from `data.confidence` when it
    /// is a number, otherwise [`DEFAULT_OBSERVATION_CONFIDENCE`].
    pub fn learn_pattern(
        &self,
        user_id: &str,
        pattern_type: &str,
        data: Payload,
    ) -> MemoryResult<UserProfile> {
        if !is_valid_type_tag(pattern_type) {
            return Err(MemoryError::InvalidPatternType(pattern_type.to_string()));
        }

        let confidence = data
            .get("confidence")
            .and_then(Value::as_f64)
            .unwrap_or(DEFAULT_OBSERVATION_CONFIDENCE);
        let observation = Observation {
            data,
            timestamp: Utc::now(),
            confidence,
        };
        let cap = self.max_observations_per_type;

        self.update(user_id, |profile| {
            let list = profile
                .learning_patterns
                .entry(pattern_type.to_string())
                .or_default();
            list.push(observation.clone());
            if list.len() > cap {
                let excess = list.len() - cap;
                list.drain(..excess);
            }
            Ok(true)
        })
    }

    /// Data of the highest-confidence observation for `pattern_type`, ties
    /// broken by the most recent. `None` when nothing has been learned.
    pub fn best_adaptive_observation(
        &self,
        user_id: &str,
        pattern_type: &str,
    ) -> MemoryResult<Option<Payload>> {
        if !is_valid_type_tag(pattern_type) {
            return Err(MemoryError::InvalidPatternType(pattern_type.to_string()));
        }
        let profile = self.get(user_id)?;

        let best = profile
            .learning_patterns
            .get(pattern_type)
            .and_then(|observations| {
                observations.iter().max_by(|a, b| {
                    a.confidence
                        .partial_cmp(&b.confidence)
                        .unwrap_or(Ordering::Equal)
                        .then(a.timestamp.cmp(&b.timestamp))
                })
            })
            .map(|o| o.data.clone());
        Ok(best)
    }

    /// Set the expertise level from its string form.
    pub fn set_expertise_level(&self, user_id: &str, level: &str) -> MemoryResult<UserProfile> {
        let level: ExpertiseLevel = level
            .parse()
            .map_err(|_| MemoryError::InvalidLevel(level.to_string()))?;
        self.update(user_id, |profile| {
            if profile.expertise_level == level {
                return Ok(false);
            }
            profile.expertise_level = level;
            Ok(true)
        })
    }

    /// Add topics to the favorites. The set only ever grows.
    pub fn add_favorite_topics<'a, I>(&self, user_id: &str, topics: I) -> MemoryResult<UserProfile>
    where
        I: IntoIterator<Item = &'a str> + Clone,
    {
        self.update(user_id, |profile| {
            let mut changed = false;
            for topic in topics.clone() {
                changed |= profile.favorite_topics.insert(topic.to_string());
            }
            Ok(changed)
        })
    }

    /// Move the preferred analysis depth one step toward `signaled`.
    pub fn nudge_analysis_depth(&self, user_id: &str, signaled: u32) -> MemoryResult<UserProfile> {
        self.update(user_id, |profile| {
            let current = profile.preferred_analysis_depth;
            profile.preferred_analysis_depth = match current.cmp(&signaled) {
                Ordering::Less => current + 1,
                Ordering::Greater => current - 1,
                Ordering::Equal => return Ok(false),
            };
            Ok(true)
        })
    }

    /// Get-or-create, then apply a versioned update.
    fn update<F>(&self, user_id: &str, mut apply: F) -> MemoryResult<UserProfile>
    where
        F: FnMut(&mut UserProfile) -> MemoryResult<bool>,
    {
        self.get_or_create(user_id)?;
        modify(self.storage.as_ref(), Table::Profiles, user_id, |profile: &mut UserProfile| {
            let changed = apply(profile)?;
            if changed {
                profile.updated_at = Utc::now();
            }
            Ok(changed)
        })?
        .ok_or_else(|| MemoryError::NoSuchUser(user_id.to_string()))
    }
}
