//! Durable conversation history.
//!
//! [`ChatStore`] persists sessions and messages in SQLite. A user's session is
//! reused while its last activity is within the configured window (24 hours
//! by default); past that, a new session is opened. Each insert is atomic on
//! its own; concurrent writers to one session interleave in arrival order.
//!
//! Every operation that depends on the wall clock has an `_at` variant taking
//! an explicit `now`.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, FixedOffset, Local, Utc};
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::models::{ConversationMessage, Role, SessionSummary, UserStats};

#[derive(Clone)]
pub struct ChatStore {
    pool: SqlitePool,
}

fn from_unix(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

impl ChatStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connects to `[db] path` and makes sure the schema exists.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config)
            .await
            .with_context(|| format!("Failed to open database: {}", config.db.path.display()))?;
        migrate::ensure_schema(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn create_session(
        &self,
        user: &str,
        user_name: Option<&str>,
        user_role: Option<&str>,
    ) -> Result<i64> {
        self.create_session_at(user, user_name, user_role, Utc::now())
            .await
    }

    pub async fn create_session_at(
        &self,
        user: &str,
        user_name: Option<&str>,
        user_role: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        let ts = now.timestamp();
        let result = sqlx::query(
            "INSERT INTO chat_sessions (user_identifiant, user_name, user_role, started_at, last_activity, is_active)
             VALUES (?, ?, ?, ?, ?, 1)",
        )
        .bind(user)
        .bind(user_name)
        .bind(user_role)
        .bind(ts)
        .bind(ts)
        .execute(&self.pool)
        .await
        .context("Failed to create session")?;

        let id = result.last_insert_rowid();
        tracing::info!(user, session_id = id, "opened chat session");
        Ok(id)
    }

    /// Returns the most recently active open session whose last activity is
    /// within `window`, or creates a new one.
    pub async fn get_active_session(&self, user: &str, window: Duration) -> Result<i64> {
        self.get_active_session_at(user, window, Utc::now()).await
    }

    pub async fn get_active_session_at(
        &self,
        user: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        let cutoff = (now - window).timestamp();
        let existing: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM chat_sessions
             WHERE user_identifiant = ? AND is_active = 1 AND last_activity > ?
             ORDER BY last_activity DESC, id DESC
             LIMIT 1",
        )
        .bind(user)
        .bind(cutoff)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to look up active session")?;

        match existing {
            Some(id) => {
                tracing::debug!(user, session_id = id, "reusing chat session");
                Ok(id)
            }
            None => self.create_session_at(user, None, None, now).await,
        }
    }

    pub async fn save_message(
        &self,
        session_id: i64,
        user: &str,
        role: Role,
        content: &str,
        metadata: Option<&serde_json::Value>,
    ) -> Result<()> {
        self.save_message_at(session_id, user, role, content, metadata, Utc::now())
            .await
    }

    /// Inserts the message and bumps the session's last activity.
    pub async fn save_message_at(
        &self,
        session_id: i64,
        user: &str,
        role: Role,
        content: &str,
        metadata: Option<&serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let ts = now.timestamp();
        let metadata = metadata.map(|m| m.to_string());

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO chat_messages (session_id, user_identifiant, role, content, created_at, metadata)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(user)
        .bind(role.as_str())
        .bind(content)
        .bind(ts)
        .bind(metadata)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to save message for session {}", session_id))?;

        sqlx::query("UPDATE chat_sessions SET last_activity = ? WHERE id = ?")
            .bind(ts)
            .bind(session_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// With a session id: that session's messages, oldest first.
    /// Without: the user's most recent messages across sessions, newest first.
    pub async fn get_user_history(
        &self,
        user: &str,
        limit: i64,
        session_id: Option<i64>,
    ) -> Result<Vec<ConversationMessage>> {
        let rows = match session_id {
            Some(sid) => {
                sqlx::query(
                    "SELECT role, content, created_at, metadata FROM chat_messages
                     WHERE session_id = ?
                     ORDER BY created_at ASC, id ASC
                     LIMIT ?",
                )
                .bind(sid)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT role, content, created_at, metadata FROM chat_messages
                     WHERE user_identifiant = ?
                     ORDER BY created_at DESC, id DESC
                     LIMIT ?",
                )
                .bind(user)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter()
            .map(|row| -> Result<ConversationMessage> {
                let role: String = row.get("role");
                let metadata: Option<String> = row.get("metadata");
                Ok(ConversationMessage {
                    role: Role::parse(&role)
                        .with_context(|| format!("Unknown role in history: {}", role))?,
                    content: row.get("content"),
                    created_at: from_unix(row.get("created_at")),
                    metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
                })
            })
            .collect()
    }

    /// Sessions with message counts, most recently active first.
    pub async fn get_user_sessions(&self, user: &str, limit: i64) -> Result<Vec<SessionSummary>> {
        let rows = sqlx::query(
            "SELECT cs.id, cs.started_at, cs.last_activity, cs.is_active,
                    COUNT(cm.id) AS message_count
             FROM chat_sessions cs
             LEFT JOIN chat_messages cm ON cs.id = cm.session_id
             WHERE cs.user_identifiant = ?
             GROUP BY cs.id
             ORDER BY cs.last_activity DESC, cs.id DESC
             LIMIT ?",
        )
        .bind(user)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| SessionSummary {
                id: row.get("id"),
                started_at: from_unix(row.get("started_at")),
                last_activity: from_unix(row.get("last_activity")),
                is_active: row.get::<i64, _>("is_active") != 0,
                message_count: row.get("message_count"),
            })
            .collect())
    }

    /// The user's recent messages rendered for the instruction prompt, in
    /// local time. Empty when the user has no history.
    pub async fn format_history_for_ai(&self, user: &str, max_messages: i64) -> Result<String> {
        let messages = self.get_user_history(user, max_messages, None).await?;
        let offset = *Local::now().offset();
        Ok(format_history(user, &messages, &offset))
    }

    /// Marks a session inactive. Returns false when no such session exists.
    pub async fn close_session(&self, session_id: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE chat_sessions SET is_active = 0 WHERE id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get_user_stats(&self, user: &str) -> Result<UserStats> {
        let row = sqlx::query(
            "SELECT COUNT(DISTINCT cs.id) AS total_sessions,
                    COUNT(cm.id) AS total_messages,
                    MIN(cs.started_at) AS first_session,
                    MAX(cs.last_activity) AS last_activity
             FROM chat_sessions cs
             LEFT JOIN chat_messages cm ON cs.id = cm.session_id
             WHERE cs.user_identifiant = ?",
        )
        .bind(user)
        .fetch_one(&self.pool)
        .await?;

        Ok(UserStats {
            total_sessions: row.get("total_sessions"),
            total_messages: row.get("total_messages"),
            first_session: row.get::<Option<i64>, _>("first_session").map(from_unix),
            last_activity: row.get::<Option<i64>, _>("last_activity").map(from_unix),
        })
    }

    /// Deletes a session and, through the foreign key, all its messages.
    pub async fn delete_session(&self, session_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM chat_sessions WHERE id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Renders `messages` (newest first, as returned by
/// [`ChatStore::get_user_history`] without a session) in chronological order.
pub fn format_history(user: &str, messages: &[ConversationMessage], offset: &FixedOffset) -> String {
    if messages.is_empty() {
        return String::new();
    }

    let mut out = String::from("\n=== HISTORIQUE DES CONVERSATIONS PRÉCÉDENTES ===\n\n");
    out.push_str(&format!("Utilisateur: {}\n", user));
    out.push_str(&format!("Nombre de messages récents: {}\n\n", messages.len()));

    for msg in messages.iter().rev() {
        out.push_str(&format!(
            "[{}] {}: {}\n\n",
            msg.created_at.with_timezone(offset).format("%d/%m/%Y %H:%M"),
            msg.role.display_label(),
            msg.content
        ));
    }

    out.push_str("=== FIN DE L'HISTORIQUE ===\n\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use tempfile::TempDir;

    async fn store() -> (TempDir, ChatStore) {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::minimal();
        config.db.path = tmp.path().join("history.sqlite");
        let store = ChatStore::open(&config).await.unwrap();
        (tmp, store)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 8, 0, 0).unwrap()
    }

    fn day() -> Duration {
        Duration::hours(24)
    }

    #[tokio::test]
    async fn schema_is_idempotent() {
        let (_tmp, store) = store().await;
        migrate::ensure_schema(store.pool()).await.unwrap();
        migrate::ensure_schema(store.pool()).await.unwrap();
    }

    #[tokio::test]
    async fn session_reused_within_window() {
        let (_tmp, store) = store().await;
        let first = store.get_active_session_at("amadou", day(), t0()).await.unwrap();
        store
            .save_message_at(first, "amadou", Role::User, "Bonjour", None, t0())
            .await
            .unwrap();

        let later = t0() + Duration::hours(23);
        let again = store.get_active_session_at("amadou", day(), later).await.unwrap();
        assert_eq!(first, again);
    }

    #[tokio::test]
    async fn session_replaced_after_window() {
        let (_tmp, store) = store().await;
        let first = store.get_active_session_at("amadou", day(), t0()).await.unwrap();

        let later = t0() + Duration::hours(25);
        let second = store.get_active_session_at("amadou", day(), later).await.unwrap();
        assert_ne!(first, second);

        let sessions = store.get_user_sessions("amadou", 10).await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].id, second);
    }

    #[tokio::test]
    async fn closed_session_is_not_reused() {
        let (_tmp, store) = store().await;
        let first = store.get_active_session_at("fatou", day(), t0()).await.unwrap();
        assert!(store.close_session(first).await.unwrap());
        assert!(!store.close_session(9999).await.unwrap());

        let second = store
            .get_active_session_at("fatou", day(), t0() + Duration::minutes(5))
            .await
            .unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn sessions_are_per_user() {
        let (_tmp, store) = store().await;
        let a = store.get_active_session_at("a", day(), t0()).await.unwrap();
        let b = store.get_active_session_at("b", day(), t0()).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn saving_refreshes_last_activity() {
        let (_tmp, store) = store().await;
        let id = store.get_active_session_at("u", day(), t0()).await.unwrap();
        // 20h + 20h keeps the session alive because each message bumps it
        let t1 = t0() + Duration::hours(20);
        store
            .save_message_at(id, "u", Role::User, "q", None, t1)
            .await
            .unwrap();
        let t2 = t1 + Duration::hours(20);
        assert_eq!(store.get_active_session_at("u", day(), t2).await.unwrap(), id);

        let sessions = store.get_user_sessions("u", 10).await.unwrap();
        assert_eq!(sessions[0].last_activity, t1);
        assert_eq!(sessions[0].message_count, 1);
    }

    #[tokio::test]
    async fn history_ordering_per_session_and_per_user() {
        let (_tmp, store) = store().await;
        let id = store.create_session_at("u", Some("Awa"), Some("pecheur"), t0()).await.unwrap();
        for (i, (role, text)) in [(Role::User, "q1"), (Role::Assistant, "r1"), (Role::User, "q2")]
            .into_iter()
            .enumerate()
        {
            store
                .save_message_at(id, "u", role, text, None, t0() + Duration::minutes(i as i64))
                .await
                .unwrap();
        }

        let session: Vec<String> = store
            .get_user_history("u", 50, Some(id))
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(session, vec!["q1", "r1", "q2"]);

        let recent = store.get_user_history("u", 2, None).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "q2");
        assert_eq!(recent[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn metadata_round_trips() {
        let (_tmp, store) = store().await;
        let id = store.create_session_at("u", None, None, t0()).await.unwrap();
        let meta = json!({ "location": "Kayar" });
        store
            .save_message_at(id, "u", Role::Assistant, "r", Some(&meta), t0())
            .await
            .unwrap();
        let history = store.get_user_history("u", 10, Some(id)).await.unwrap();
        assert_eq!(history[0].metadata, Some(meta));
    }

    #[tokio::test]
    async fn deleting_session_cascades_to_messages() {
        let (_tmp, store) = store().await;
        let id = store.create_session_at("u", None, None, t0()).await.unwrap();
        store
            .save_message_at(id, "u", Role::User, "q", None, t0())
            .await
            .unwrap();

        assert!(store.delete_session(id).await.unwrap());
        assert!(store.get_user_history("u", 10, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn message_for_unknown_session_is_rejected() {
        let (_tmp, store) = store().await;
        let err = store
            .save_message_at(42, "u", Role::User, "q", None, t0())
            .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn stats_count_sessions_and_messages() {
        let (_tmp, store) = store().await;
        let empty = store.get_user_stats("nobody").await.unwrap();
        assert_eq!(empty.total_sessions, 0);
        assert_eq!(empty.first_session, None);

        let a = store.create_session_at("u", None, None, t0()).await.unwrap();
        store
            .save_message_at(a, "u", Role::User, "q", None, t0())
            .await
            .unwrap();
        store
            .save_message_at(a, "u", Role::Assistant, "r", None, t0())
            .await
            .unwrap();
        let later = t0() + Duration::days(3);
        store.create_session_at("u", None, None, later).await.unwrap();

        let stats = store.get_user_stats("u").await.unwrap();
        assert_eq!(stats.total_sessions, 2);
        assert_eq!(stats.total_messages, 2);
        assert_eq!(stats.first_session, Some(t0()));
        assert_eq!(stats.last_activity, Some(later));
    }

    #[test]
    fn format_history_is_chronological() {
        let utc = FixedOffset::east_opt(0).unwrap();
        let msg = |role, content: &str, minute| ConversationMessage {
            role,
            content: content.to_string(),
            created_at: Utc.with_ymd_and_hms(2026, 10, 15, 18, minute, 0).unwrap(),
            metadata: None,
        };
        // newest first, as the store returns them
        let messages = vec![msg(Role::Assistant, "Vers 17h.", 1), msg(Role::User, "Quand sortir ?", 0)];

        assert_eq!(
            format_history("amadou", &messages, &utc),
            "\n=== HISTORIQUE DES CONVERSATIONS PRÉCÉDENTES ===\n\n\
             Utilisateur: amadou\n\
             Nombre de messages récents: 2\n\n\
             [15/10/2026 18:00] Utilisateur: Quand sortir ?\n\n\
             [15/10/2026 18:01] Assistant: Vers 17h.\n\n\
             === FIN DE L'HISTORIQUE ===\n\n"
        );
    }

    #[test]
    fn empty_history_formats_to_nothing() {
        let utc = FixedOffset::east_opt(0).unwrap();
        assert_eq!(format_history("u", &[], &utc), "");
    }
}
