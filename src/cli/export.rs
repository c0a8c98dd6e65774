use anyhow::Result;
use serde::Serialize;

use recollect::config::RecollectConfig;
use recollect::memory::types::{
    AdaptiveResponsePattern, CrossSessionMemoryEntry, SessionTranscript, UserProfile,
};

/// Export format — everything stored for one user.
#[derive(Debug, Serialize)]
struct ExportData {
    profile: UserProfile,
    sessions: Vec<SessionTranscript>,
    memories: Vec<CrossSessionMemoryEntry>,
    patterns: Vec<AdaptiveResponsePattern>,
}

/// Export one user's records as JSON to stdout.
pub fn export(config: &RecollectConfig, user_id: &str) -> Result<()> {
    let manager = super::open_manager(config)?;

    let data = ExportData {
        profile: manager.profile(user_id)?,
        sessions: manager.sessions().list_for_user(user_id)?,
        memories: manager.memories().list_for_user(user_id)?,
        patterns: manager
            .patterns()
            .ranked(user_id)?
            .into_iter()
            .map(|r| r.pattern)
            .collect(),
    };

    println!("{}", serde_json::to_string_pretty(&data)?);
    eprintln!(
        "Exported {} session(s), {} memory(s) and {} pattern(s) for {user_id}.",
        data.sessions.len(),
        data.memories.len(),
        data.patterns.len()
    );
    Ok(())
}
