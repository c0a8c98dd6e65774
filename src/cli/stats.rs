use anyhow::Result;

use recollect::config::RecollectConfig;
use recollect::MemoryManager;

/// Display store-wide statistics, or one user's insights with `user`.
pub fn stats(config: &RecollectConfig, user: Option<&str>) -> Result<()> {
    let manager = super::open_manager(config)?;
    match user {
        Some(user_id) => user_insights(&manager, user_id),
        None => store_stats(&manager),
    }
}

fn store_stats(manager: &MemoryManager) -> Result<()> {
    let stats = manager.store_stats()?;

    println!("Memory Statistics");
    println!("{}", "=".repeat(40));
    println!("  Users:               {}", stats.users);
    println!("  Sessions:            {}", stats.sessions);
    println!("    Active:            {}", stats.active_sessions);
    println!("  Memories:            {}", stats.memories);
    println!("    Expired (pending): {}", stats.expired_memories);
    println!("  Response patterns:   {}", stats.patterns);

    Ok(())
}

fn user_insights(manager: &MemoryManager, user_id: &str) -> Result<()> {
    let insights = manager.user_insights(user_id)?;

    println!("User: {}", insights.user_id);
    println!("{}", "=".repeat(40));
    println!("  Expertise:           {}", insights.expertise_level);
    println!("  Analysis depth:      {}", insights.preferred_analysis_depth);
    println!("  Favorite topics:     {}", insights.favorite_topics.join(", "));
    if !insights.preferences.is_empty() {
        println!(
            "  Preferences:         {}",
            serde_json::to_string(&insights.preferences)?
        );
    }
    println!(
        "  Sessions:            {} ({} active)",
        insights.total_sessions, insights.active_sessions
    );
    println!();

    println!("Observations:");
    for (pattern_type, count) in &insights.observations {
        println!("  {:<20} {}", pattern_type, count);
    }
    println!();

    println!("Memories by type:");
    for (memory_type, count) in &insights.memories_by_type {
        println!("  {:<20} {}", memory_type, count);
    }
    if insights.pending_expiry > 0 {
        println!("  ({} expired, awaiting reap)", insights.pending_expiry);
    }
    println!();

    if !insights.top_memories.is_empty() {
        println!("Top memories:");
        for m in &insights.top_memories {
            println!(
                "  {:<18} {:<28} importance {:.2}, used {}x",
                m.memory_type, m.memory_key, m.importance_score, m.access_count
            );
        }
        println!();
    }

    if !insights.patterns.is_empty() {
        println!("Response patterns:");
        println!(
            "  {:<20} {:<8} {:<6} {:<7} {}",
            "Type", "Rate", "Uses", "Score", "Trusted"
        );
        for p in &insights.patterns {
            println!(
                "  {:<20} {:<8.3} {:<6} {:<7.3} {}",
                p.pattern_type,
                p.success_rate,
                p.usage_count,
                p.score,
                if p.trusted { "yes" } else { "no" }
            );
        }
    }

    Ok(())
}
