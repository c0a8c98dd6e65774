mod helpers;

use chrono::{Duration, Utc};
use helpers::{for_each_backend, payload};
use recollect::memory::types::{ExpertiseLevel, Payload};
use serde_json::{json, Value};

#[test]
fn preferences_and_expertise_are_recorded() {
    for_each_backend(|backend, m| {
        m.get_or_create_profile("U1").unwrap();
        m.update_preferences("U1", &payload(json!({"depth": "detailed"})))
            .unwrap();
        m.set_expertise_level("U1", "intermediate").unwrap();

        let profile = m.profile("U1").unwrap();
        assert_eq!(profile.expertise_level, ExpertiseLevel::Intermediate, "{backend}");
        assert_eq!(profile.preferences["depth"], "detailed", "{backend}");
    });
}

#[test]
fn preference_updates_merge() {
    for_each_backend(|backend, m| {
        m.update_preferences("u", &payload(json!({"a": 1}))).unwrap();
        m.update_preferences("u", &payload(json!({"b": 2}))).unwrap();
        let profile = m.profile("u").unwrap();
        assert_eq!(Value::Object(profile.preferences), json!({"a": 1, "b": 2}), "{backend}");

        m.update_preferences("u", &payload(json!({"a": null}))).unwrap();
        let profile = m.profile("u").unwrap();
        assert_eq!(Value::Object(profile.preferences), json!({"b": 2}), "{backend}");
    });
}

#[test]
fn ended_session_is_folded_into_cross_session_memory() {
    for_each_backend(|backend, m| {
        m.start_session("S1", "U1", None).unwrap();
        m.record_user_turn("S1", "Show me campaign performance data", Payload::new(), None)
            .unwrap();
        let summary = m.end_session("S1").unwrap();

        assert!(summary.topics_discussed.contains("campaign_management"), "{backend}");
        let entry = m
            .memories()
            .list_for_user("U1")
            .unwrap()
            .into_iter()
            .find(|e| e.memory_type == "topic_expertise" && e.memory_key == "campaign_management")
            .expect("topic entry");
        assert_eq!(entry.importance_score, 0.7, "{backend}");

        let hits = m
            .retrieve_relevant_memories("U1", "campaign", Some(10))
            .unwrap();
        assert!(hits.iter().any(|e| e.id == entry.id), "{backend}");
    });
}

#[test]
fn ending_twice_changes_nothing() {
    for_each_backend(|backend, m| {
        m.start_session("S1", "U1", None).unwrap();
        m.record_user_turn("S1", "Keep the budget report simple", Payload::new(), None)
            .unwrap();

        let first = m.end_session("S1").unwrap();
        let entries = m.memories().list_for_user("U1").unwrap();
        let transcript = m.session("S1").unwrap();

        let second = m.end_session("S1").unwrap();
        assert_eq!(first, second, "{backend}");
        assert_eq!(m.memories().list_for_user("U1").unwrap(), entries, "{backend}");
        assert_eq!(m.session("S1").unwrap(), transcript, "{backend}");
    });
}

#[test]
fn success_rate_tracks_outcomes_and_gates_selection() {
    for_each_backend(|backend, m| {
        let triggers = payload(json!({"expertise": "intermediate"}));
        m.store_response_pattern("U1", "perf", &triggers, &payload(json!({"format": "table"})))
            .unwrap();
        for _ in 0..4 {
            m.record_pattern_outcome("U1", "perf", true).unwrap();
        }
        let pattern = m
            .record_pattern_outcome("U1", "perf", false)
            .unwrap()
            .unwrap();

        assert_eq!(pattern.usage_count, 5, "{backend}");
        assert!((pattern.success_rate - 0.8).abs() < 1e-12, "{backend}");

        let selected = m
            .get_adaptive_response("U1", "perf", &payload(json!({"expertise": "intermediate"})))
            .unwrap()
            .expect("pattern qualifies");
        assert_eq!(selected.response_template["format"], "table", "{backend}");
    });
}

#[test]
fn running_mean_is_exact_over_long_sequences() {
    for_each_backend(|backend, m| {
        m.store_response_pattern("u", "p", &Payload::new(), &Payload::new())
            .unwrap();
        let outcomes: Vec<bool> = (0..50).map(|i| i % 3 != 0).collect();
        for &o in &outcomes {
            m.record_pattern_outcome("u", "p", o).unwrap();
        }
        let pattern = m.patterns().get("u", "p").unwrap().unwrap();
        let successes = outcomes.iter().filter(|&&o| o).count() as f64;
        assert_eq!(pattern.usage_count, 50, "{backend}");
        assert!((pattern.success_rate - successes / 50.0).abs() < 1e-12, "{backend}");
    });
}

#[test]
fn cold_start_patterns_are_never_selected() {
    for_each_backend(|backend, m| {
        m.store_response_pattern("u", "p", &Payload::new(), &Payload::new())
            .unwrap();
        for _ in 0..3 {
            m.record_pattern_outcome("u", "p", true).unwrap();
        }
        let pattern = m.patterns().get("u", "p").unwrap().unwrap();
        assert_eq!(pattern.success_rate, 1.0, "{backend}");
        assert!(m
            .get_adaptive_response("u", "p", &Payload::new())
            .unwrap()
            .is_none(), "{backend}");
    });
}

#[test]
fn expired_entry_is_hidden_then_reaped() {
    for_each_backend(|backend, m| {
        let entry = m
            .remember(
                "U1",
                "fact",
                "k1",
                &payload(json!({"v": 1})),
                0.9,
                Some(Utc::now() - Duration::seconds(1)),
            )
            .unwrap();

        assert!(m.retrieve_relevant_memories("U1", "k1", Some(10)).unwrap().is_empty(), "{backend}");
        assert!(m.cleanup_expired().unwrap() >= 1, "{backend}");
        assert!(m.memories().get(&entry.id).unwrap().is_none(), "{backend}");
        assert!(m.memories().list_for_user("U1").unwrap().is_empty(), "{backend}");
    });
}

#[test]
fn similar_sessions_share_topics() {
    for_each_backend(|backend, m| {
        m.start_session("old-budget", "u", None).unwrap();
        m.record_user_turn("old-budget", "what is my budget?", Payload::new(), None)
            .unwrap();
        m.end_session("old-budget").unwrap();

        m.start_session("old-audience", "u", None).unwrap();
        m.record_user_turn("old-audience", "which audience segment?", Payload::new(), None)
            .unwrap();
        m.end_session("old-audience").unwrap();

        m.start_session("now", "u", None).unwrap();
        m.record_user_turn("now", "raise the bid and budget", Payload::new(), None)
            .unwrap();

        let similar: Vec<String> = m
            .similar_sessions("now", None)
            .unwrap()
            .into_iter()
            .map(|s| s.session_id)
            .collect();
        assert_eq!(similar, vec!["old-budget"], "{backend}");
    });
}

#[test]
fn touch_counts_use_not_retrieval() {
    for_each_backend(|backend, m| {
        let entry = m
            .remember("u", "fact", "favorite_channel", &payload(json!({"channel": "search"})), 0.5, None)
            .unwrap();
        m.retrieve_relevant_memories("u", "search", None).unwrap();
        m.retrieve_relevant_memories("u", "search", None).unwrap();
        let touched = m.touch_memory(&entry.id).unwrap().unwrap();
        assert_eq!(touched.access_count, 1, "{backend}");
        assert!(touched.last_accessed_at >= entry.last_accessed_at, "{backend}");
    });
}
