use chrono::{DateTime, Local, Utc};

use crate::domain::models::{OverallStats, Session, StatSnapshot};

/// Compact rendering: 1.50K, 2.25M, otherwise two decimals.
pub fn format_number(num: f64) -> String {
    if num >= 1_000_000.0 {
        format!("{:.2}M", num / 1_000_000.0)
    } else if num >= 1_000.0 {
        format!("{:.2}K", num / 1_000.0)
    } else {
        format!("{:.2}", num)
    }
}

pub fn format_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn session_line(session: &Session) -> String {
    let end = session
        .end_time
        .map(format_time)
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{:>15}  {:<7}  {}  {}  {:>9} H/s  total {:>9}  accepted {:>9}",
        session.id,
        session.status.to_string(),
        format_time(session.start_time),
        end,
        format_number(session.hashes_per_second),
        format_number(session.total_hashes as f64),
        format_number(session.accepted_hashes as f64),
    )
}

pub fn snapshot_line(snapshot: &StatSnapshot) -> String {
    format!(
        "{}  {:>9} H/s  total {:>9}",
        format_time(snapshot.timestamp),
        format_number(snapshot.hashes_per_second),
        format_number(snapshot.total_hashes as f64),
    )
}

pub fn overall_lines(stats: &OverallStats) -> Vec<String> {
    vec![
        format!("Sessions:        {}", stats.total_sessions),
        format!("Total hashes:    {}", format_number(stats.total_hashes as f64)),
        format!("Accepted hashes: {}", format_number(stats.accepted_hashes as f64)),
        format!("Avg hash rate:   {} H/s", format_number(stats.avg_hash_rate)),
    ]
}
