//! Session persistence: auto-save under the platform data directory and
//! explicit JSON export.

use crate::model::{now_rfc3339, SessionStats};
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct SessionRecord<'a> {
    session_id: &'a str,
    actor: &'a str,
    finished_utc: String,
    stats: &'a SessionStats,
}

fn sessions_dir() -> Result<PathBuf> {
    let base = dirs::data_dir().context("resolve platform data directory")?;
    Ok(base.join("gridpilot").join("sessions"))
}

/// Save a finished session to the default auto-save location and return the
/// path written.
pub fn save_session(session_id: &str, actor: &str, stats: &SessionStats) -> Result<PathBuf> {
    let dir = sessions_dir()?;
    save_session_to(&dir, session_id, actor, stats)
}

pub fn save_session_to(
    dir: &Path,
    session_id: &str,
    actor: &str,
    stats: &SessionStats,
) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create session directory {}", dir.display()))?;
    let finished = now_rfc3339();
    // Timestamps carry colons, which are not filename-safe everywhere.
    let name = format!(
        "session-{}-{}.json",
        finished.replace(':', "-"),
        &session_id[..8.min(session_id.len())]
    );
    let path = dir.join(name);
    write_record(&path, session_id, actor, finished, stats)?;
    Ok(path)
}

/// Write the session record to an explicit user-chosen path.
pub fn export_json(path: &Path, session_id: &str, actor: &str, stats: &SessionStats) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create export directory {}", parent.display()))?;
        }
    }
    write_record(path, session_id, actor, now_rfc3339(), stats)
}

fn write_record(
    path: &Path,
    session_id: &str,
    actor: &str,
    finished_utc: String,
    stats: &SessionStats,
) -> Result<()> {
    let record = SessionRecord {
        session_id,
        actor,
        finished_utc,
        stats,
    };
    let json = serde_json::to_string_pretty(&record).context("serialize session record")?;
    std::fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
    tracing::debug!(path = %path.display(), "session saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saves_and_round_trips_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut stats = SessionStats {
            tiles_visited: 42,
            metal_gained: 1200,
            ..Default::default()
        };
        stats.record_item("relic");

        let path =
            save_session_to(dir.path(), "1234567890abcdef", "hero", &stats).unwrap();
        assert!(path.exists());
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("session-"));
        assert!(!name.contains(':'));

        let raw = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["actor"], "hero");
        assert_eq!(parsed["session_id"], "1234567890abcdef");
        assert_eq!(parsed["stats"]["tiles_visited"], 42);
        assert_eq!(parsed["stats"]["items_found"]["relic"], 1);
    }

    #[test]
    fn export_creates_missing_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.json");
        export_json(&path, "abc", "hero", &SessionStats::default()).unwrap();
        assert!(path.exists());
    }
}
