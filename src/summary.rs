//! Human-readable session summary for text-mode CLI output.

use crate::model::SessionStats;
use std::time::Duration;

/// Format the end-of-session report as pre-built lines.
pub(crate) fn session_summary_lines(stats: &SessionStats) -> Vec<String> {
    let mut lines = Vec::new();

    let elapsed = Duration::from_millis(stats.elapsed_ms);
    lines.push(format!(
        "Session: {} tiles visited in {}",
        stats.tiles_visited,
        humantime::format_duration(Duration::from_secs(elapsed.as_secs()))
    ));
    lines.push(format!(
        "Resources: +{} metal, +{} energy",
        stats.metal_gained, stats.energy_gained
    ));

    if !stats.items_found.is_empty() {
        let items: Vec<String> = stats
            .items_found
            .iter()
            .map(|(category, n)| format!("{category} x{n}"))
            .collect();
        lines.push(format!("Items: {}", items.join(", ")));
    }

    if stats.attacks_launched > 0 {
        lines.push(format!(
            "Combat: {} attacks ({} won, {} lost)",
            stats.attacks_launched, stats.attacks_won, stats.attacks_lost
        ));
    }

    if stats.errors > 0 {
        lines.push(format!("Errors: {}", stats.errors));
    }

    lines
}
