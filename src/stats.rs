//! Conversation history inspection for `sunupeche stats`, `sessions` and
//! `history`.

use anyhow::Result;
use chrono::{DateTime, Local, Utc};

use crate::models::{ConversationMessage, SessionSummary, UserStats};
use crate::store::ChatStore;

pub async fn run_stats(store: &ChatStore, user: &str) -> Result<()> {
    let stats = store.get_user_stats(user).await?;
    print!("{}", render_stats(user, &stats, Utc::now()));
    Ok(())
}

pub async fn run_sessions(store: &ChatStore, user: &str, limit: i64) -> Result<()> {
    let sessions = store.get_user_sessions(user, limit).await?;
    print!("{}", render_sessions(&sessions, Utc::now()));
    Ok(())
}

pub async fn run_history(
    store: &ChatStore,
    user: &str,
    limit: i64,
    session_id: Option<i64>,
) -> Result<()> {
    let mut messages = store.get_user_history(user, limit, session_id).await?;
    if session_id.is_none() {
        messages.reverse();
    }
    if messages.is_empty() {
        println!("No history for {}", user);
        return Ok(());
    }
    for m in &messages {
        println!("{}", render_message(m));
    }
    Ok(())
}

pub fn render_stats(user: &str, stats: &UserStats, now: DateTime<Utc>) -> String {
    let mut out = format!("SunuPeche history for {}\n", user);
    out.push_str(&"=".repeat(32));
    out.push_str("\n\n");
    out.push_str(&format!("  Sessions:       {}\n", stats.total_sessions));
    out.push_str(&format!("  Messages:       {}\n", stats.total_messages));
    out.push_str(&format!(
        "  First session:  {}\n",
        stats.first_session.map(format_ts_iso).unwrap_or_else(|| "never".to_string())
    ));
    out.push_str(&format!(
        "  Last activity:  {}\n",
        stats
            .last_activity
            .map(|t| format_ts_relative(t, now))
            .unwrap_or_else(|| "never".to_string())
    ));
    out
}

pub fn render_sessions(sessions: &[SessionSummary], now: DateTime<Utc>) -> String {
    if sessions.is_empty() {
        return "No sessions\n".to_string();
    }
    let mut out = format!(
        "{:>6} {:<18} {:<16} {:>8}  {}\n",
        "ID", "STARTED", "LAST ACTIVITY", "MESSAGES", "STATUS"
    );
    for s in sessions {
        out.push_str(&format!(
            "{:>6} {:<18} {:<16} {:>8}  {}\n",
            s.id,
            format_ts_iso(s.started_at),
            format_ts_relative(s.last_activity, now),
            s.message_count,
            if s.is_active { "active" } else { "closed" }
        ));
    }
    out
}

fn render_message(m: &ConversationMessage) -> String {
    format!(
        "[{}] {}: {}",
        m.created_at.with_timezone(&Local).format("%d/%m/%Y %H:%M"),
        m.role.display_label(),
        m.content
    )
}

/// Relative time such as "3 hours ago"; older than 30 days falls back to a date.
fn format_ts_relative(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = (now - ts).num_seconds();

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M").to_string()
}
