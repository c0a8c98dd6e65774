//! CLI `inspect` command — display a single profile or session in full.

use anyhow::Result;

use recollect::config::RecollectConfig;

/// Print a user profile.
pub fn inspect_profile(config: &RecollectConfig, user_id: &str) -> Result<()> {
    let manager = super::open_manager(config)?;
    let p = manager.profile(user_id)?;

    println!("Profile: {}", p.user_id);
    println!("{}", "=".repeat(50));
    println!("  Expertise:       {}", p.expertise_level);
    println!("  Analysis depth:  {}", p.preferred_analysis_depth);
    println!("  Created:         {}", p.created_at.to_rfc3339());
    println!("  Updated:         {}", p.updated_at.to_rfc3339());
    println!("  Preferences:     {}", serde_json::to_string_pretty(&p.preferences)?);
    println!();

    if !p.favorite_topics.is_empty() {
        println!("Favorite topics:");
        for topic in &p.favorite_topics {
            println!("  {topic}");
        }
        println!();
    }

    if !p.learning_patterns.is_empty() {
        println!("Learned observations:");
        for (pattern_type, observations) in &p.learning_patterns {
            println!("  {pattern_type} ({})", observations.len());
            if let Some(last) = observations.last() {
                println!(
                    "    latest: {} (confidence {:.2}) {}",
                    last.timestamp.to_rfc3339(),
                    last.confidence,
                    serde_json::to_string(&last.data)?
                );
            }
        }
    }

    Ok(())
}

/// Print a session transcript and its summary.
pub fn inspect_session(config: &RecollectConfig, session_id: &str) -> Result<()> {
    let manager = super::open_manager(config)?;
    let s = manager.session(session_id)?;

    println!("Session: {}", s.session_id);
    println!("{}", "=".repeat(50));
    println!("  User:            {}", s.user_id);
    if let Some(ref account) = s.external_account_ref {
        println!("  Account:         {account}");
    }
    println!(
        "  State:           {}",
        match (s.is_active, s.archived) {
            (true, _) => "active",
            (false, true) => "ended",
            (false, false) => "ended (not yet archived)",
        }
    );
    println!("  Created:         {}", s.created_at.to_rfc3339());
    if let Some(ended) = s.ended_at {
        println!("  Ended:           {}", ended.to_rfc3339());
    }
    println!(
        "  Logged:          {} analyses, {} generations",
        s.analysis_results.len(),
        s.creative_generations.len()
    );
    println!();

    println!("Messages:");
    for m in &s.messages {
        println!("  {} [{}] {}", m.timestamp.to_rfc3339(), m.role, m.content);
    }

    if !s.intents.is_empty() {
        println!();
        println!("Intents:");
        for i in &s.intents {
            println!("  {} {}", i.timestamp.to_rfc3339(), i.intent);
        }
    }

    if let Some(ref cached) = s.context_summary {
        println!();
        println!(
            "Summary{}:",
            if cached.finalized { " (final)" } else { "" }
        );
        println!("{}", serde_json::to_string_pretty(&cached.summary)?);
    }

    Ok(())
}
