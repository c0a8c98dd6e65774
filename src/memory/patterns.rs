//! Adaptive response patterns and the selector that picks between them.
//!
//! One pattern per `(user, pattern_type)`. Its success rate is the exact mean
//! of recorded outcomes, kept as an integer success count next to the usage
//! count so repeated updates never accumulate rounding error.

use std::sync::Arc;

use chrono::Utc;

use super::types::{merge_payload, subset_match, AdaptiveResponsePattern, Payload};
use super::{decode, encode, is_valid_type_tag, load, modify, validate_id};
use crate::config::PatternConfig;
use crate::error::{MemoryError, MemoryResult};
use crate::storage::{composite_key, key_prefix, Storage, Table};

/// A stored pattern with its selector verdict.
#[derive(Debug, Clone)]
pub struct RankedPattern {
    pub pattern: AdaptiveResponsePattern,
    /// Success rate and usage both clear the thresholds.
    pub trusted: bool,
    pub score: f64,
}

pub struct AdaptivePatternStore {
    storage: Arc<dyn Storage>,
    config: PatternConfig,
}

impl AdaptivePatternStore {
    pub fn new(storage: Arc<dyn Storage>, config: PatternConfig) -> Self {
        Self { storage, config }
    }

    /// Create the pattern or merge new triggers and template fields into it.
    /// Outcome statistics are never touched here.
    pub fn store(
        &self,
        user_id: &str,
        pattern_type: &str,
        trigger_conditions: &Payload,
        response_template: &Payload,
    ) -> MemoryResult<AdaptiveResponsePattern> {
        let key = pattern_key(user_id, pattern_type)?;

        loop {
            let updated = modify(
                self.storage.as_ref(),
                Table::Patterns,
                &key,
                |pattern: &mut AdaptiveResponsePattern| {
                    merge_payload(&mut pattern.trigger_conditions, trigger_conditions);
                    merge_payload(&mut pattern.response_template, response_template);
                    pattern.updated_at = Utc::now();
                    Ok(true)
                },
            )?;
            if let Some(pattern) = updated {
                return Ok(pattern);
            }

            let now = Utc::now();
            let mut pattern = AdaptiveResponsePattern {
                user_id: user_id.to_string(),
                pattern_type: pattern_type.to_string(),
                trigger_conditions: Payload::new(),
                response_template: Payload::new(),
                success_rate: 0.0,
                usage_count: 0,
                success_count: 0,
                created_at: now,
                updated_at: now,
            };
            merge_payload(&mut pattern.trigger_conditions, trigger_conditions);
            merge_payload(&mut pattern.response_template, response_template);

            if self
                .storage
                .put_if_absent(Table::Patterns, &key, &encode(&pattern)?)?
            {
                tracing::info!(user_id, pattern_type, "response pattern stored");
                return Ok(pattern);
            }
        }
    }

    pub fn get(
        &self,
        user_id: &str,
        pattern_type: &str,
    ) -> MemoryResult<Option<AdaptiveResponsePattern>> {
        let key = pattern_key(user_id, pattern_type)?;
        load(self.storage.as_ref(), Table::Patterns, &key)
    }

    /// The best trusted pattern of this type whose triggers all hold in
    /// `context`, or `None` so the caller falls back to a non-adaptive path.
    pub fn select_best(
        &self,
        user_id: &str,
        pattern_type: &str,
        context: &Payload,
    ) -> MemoryResult<Option<AdaptiveResponsePattern>> {
        let candidates = self.get(user_id, pattern_type)?;

        let best = candidates
            .into_iter()
            .filter(|p| subset_match(&p.trigger_conditions, context) && self.is_trusted(p))
            .max_by(|a, b| self.score(a).total_cmp(&self.score(b)));

        match &best {
            Some(p) => tracing::debug!(
                user_id,
                pattern_type,
                success_rate = p.success_rate,
                usage_count = p.usage_count,
                "adaptive pattern selected"
            ),
            None => tracing::debug!(user_id, pattern_type, "no qualifying pattern"),
        }
        Ok(best)
    }

    /// Fold one outcome into the pattern's statistics. `None` (with a warning)
    /// if the pattern does not exist.
    pub fn record_outcome(
        &self,
        user_id: &str,
        pattern_type: &str,
        was_successful: bool,
    ) -> MemoryResult<Option<AdaptiveResponsePattern>> {
        let key = pattern_key(user_id, pattern_type)?;
        let updated = modify(
            self.storage.as_ref(),
            Table::Patterns,
            &key,
            |pattern: &mut AdaptiveResponsePattern| {
                pattern.usage_count += 1;
                if was_successful {
                    pattern.success_count += 1;
                }
                pattern.success_rate = pattern.success_count as f64 / pattern.usage_count as f64;
                pattern.updated_at = Utc::now();
                Ok(true)
            },
        )?;

        if updated.is_none() {
            tracing::warn!(user_id, pattern_type, "outcome recorded for unknown pattern");
        }
        Ok(updated)
    }

    /// Every pattern of a user with its selector verdict, best score first.
    pub fn ranked(&self, user_id: &str) -> MemoryResult<Vec<RankedPattern>> {
        validate_id("user id", user_id)?;
        let mut ranked = self
            .storage
            .scan_prefix(Table::Patterns, &key_prefix(&[user_id]))?
            .into_iter()
            .map(|(_, record)| -> MemoryResult<RankedPattern> {
                let pattern: AdaptiveResponsePattern = decode(record.value)?;
                Ok(RankedPattern {
                    trusted: self.is_trusted(&pattern),
                    score: self.score(&pattern),
                    pattern,
                })
            })
            .collect::<MemoryResult<Vec<_>>>()?;

        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(ranked)
    }

    /// Rate and volume both strictly above their thresholds. Cold-start
    /// patterns never qualify however good their rate looks.
    pub fn is_trusted(&self, pattern: &AdaptiveResponsePattern) -> bool {
        pattern.success_rate > self.config.min_success_rate
            && pattern.usage_count > self.config.min_usage_count
    }

    pub fn score(&self, pattern: &AdaptiveResponsePattern) -> f64 {
        pattern.success_rate * (1.0 + pattern.usage_count as f64 * self.config.volume_weight)
    }
}

fn pattern_key(user_id: &str, pattern_type: &str) -> MemoryResult<String> {
    validate_id("user id", user_id)?;
    if !is_valid_type_tag(pattern_type) {
        return Err(MemoryError::InvalidPatternType(pattern_type.to_string()));
    }
    Ok(composite_key(&[user_id, pattern_type]))
}
