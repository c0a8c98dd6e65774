//! Rule-based derivation of a [`ContextSummary`] from a transcript.
//!
//! Topics come from keyword sets matched against user-authored messages.
//! Preferences come from cue words; when cues conflict the one written last
//! wins, both across messages and within a single message.

use std::collections::BTreeSet;

use serde_json::Value;

use super::types::{ContextSummary, LoggedRecord, Payload, SessionTranscript};

/// Topic tag → keywords (lowercase). A message mentioning any keyword
/// discusses the topic.
const TOPIC_KEYWORDS: &[(&str, &[&str])] = &[
    ("campaign_management", &["campaign"]),
    (
        "performance_analysis",
        &["performance", "metric", "roas", "ctr", "conversion", "impression"],
    ),
    ("budget_optimization", &["budget", "spend", "bid", "cost"]),
    (
        "audience_targeting",
        &["audience", "targeting", "demographic", "segment"],
    ),
    (
        "creative_generation",
        &["creative", "ad copy", "headline", "slogan"],
    ),
    ("reporting", &["report", "dashboard", "export"]),
];

/// Preference key → (cue word, value) pairs.
const PREFERENCE_CUES: &[(&str, &[(&str, &str)])] = &[
    (
        "depth",
        &[
            ("detailed", "detailed"),
            ("deep", "detailed"),
            ("simple", "summary"),
            ("summary", "summary"),
        ],
    ),
    (
        "format",
        &[
            ("visual", "visual"),
            ("chart", "visual"),
            ("table", "tabular"),
            ("data", "tabular"),
        ],
    ),
];

/// Keys of creative generations carried into the style digest.
const CREATIVE_STYLE_KEYS: &[&str] = &["style", "tone", "format"];

/// Topics mentioned in one piece of text.
pub fn extract_topics(text: &str) -> BTreeSet<String> {
    let lower = text.to_lowercase();
    TOPIC_KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(topic, _)| topic.to_string())
        .collect()
}

/// Preference cues in one piece of text. Per key, the cue occurring last wins.
pub fn extract_preferences(text: &str) -> Payload {
    let lower = text.to_lowercase();
    let mut preferences = Payload::new();

    for (key, cues) in PREFERENCE_CUES {
        let last = cues
            .iter()
            .filter_map(|(cue, value)| lower.rfind(cue).map(|pos| (pos, *value)))
            .max_by_key(|(pos, _)| *pos);
        if let Some((_, value)) = last {
            preferences.insert(key.to_string(), Value::from(value));
        }
    }
    preferences
}

/// Full summary over a transcript.
pub fn summarize(transcript: &SessionTranscript) -> ContextSummary {
    let mut summary = ContextSummary::default();

    for body in transcript.user_messages() {
        summary.topics_discussed.extend(extract_topics(body));
        super::types::merge_payload(&mut summary.user_preferences, &extract_preferences(body));
    }

    summary.analysis_focus = analysis_focus(&transcript.analysis_results);
    summary.creative_style = creative_style(&transcript.creative_generations);
    summary
}

/// Count of analyses per `type` field (`general` when absent).
fn analysis_focus(results: &[LoggedRecord]) -> Payload {
    let mut focus = Payload::new();
    for result in results {
        let kind = result
            .data
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("general");
        let count = focus.get(kind).and_then(Value::as_u64).unwrap_or(0);
        focus.insert(kind.to_string(), Value::from(count + 1));
    }
    focus
}

/// Latest style/tone/format seen across generations, plus a count.
fn creative_style(generations: &[LoggedRecord]) -> Payload {
    let mut style = Payload::new();
    if generations.is_empty() {
        return style;
    }
    for generation in generations {
        for key in CREATIVE_STYLE_KEYS {
            if let Some(value) = generation.data.get(*key) {
                style.insert(key.to_string(), value.clone());
            }
        }
    }
    style.insert("generations".to_string(), Value::from(generations.len()));
    style
}
