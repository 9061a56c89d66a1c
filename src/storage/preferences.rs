use super::schema::Database;
use super::types::DatabaseError;

/// Preference key holding the most recently fetched feed URL.
pub const LAST_FEED_URL: &str = "feed.last_url";

impl Database {
    // ========================================================================
    // User Preferences Operations
    // ========================================================================

    /// Get a single preference value by key.
    ///
    /// Returns `None` when the key has never been set.
    pub async fn get_preference(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM user_preferences WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(value,)| value))
    }

    /// Set a preference value (UPSERT).
    pub async fn set_preference(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO user_preferences (key, value, updated_at)
            VALUES (?, ?, datetime('now'))
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        tracing::debug!(key = %key, "Saved preference");
        Ok(())
    }

    /// Get all preferences whose key starts with `prefix`, ordered by key.
    ///
    /// `%` and `_` in the prefix match literally.
    pub async fn get_preferences_by_prefix(
        &self,
        prefix: &str,
    ) -> Result<Vec<(String, String)>, DatabaseError> {
        let pattern = format!("{}%", escape_like(prefix));
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT key, value FROM user_preferences WHERE key LIKE ? ESCAPE '\\' ORDER BY key",
        )
        .bind(&pattern)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_get_preference_missing() {
        let db = test_db().await;
        let value = db.get_preference("nonexistent.key").await.unwrap();
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn test_set_and_get_preference() {
        let db = test_db().await;
        db.set_preference(LAST_FEED_URL, "https://example.com/rss")
            .await
            .unwrap();

        let value = db.get_preference(LAST_FEED_URL).await.unwrap();
        assert_eq!(value, Some("https://example.com/rss".to_string()));
    }

    #[tokio::test]
    async fn test_set_preference_upsert() {
        let db = test_db().await;
        db.set_preference("list.width", "60").await.unwrap();
        db.set_preference("list.width", "80").await.unwrap();

        let value = db.get_preference("list.width").await.unwrap();
        assert_eq!(value, Some("80".to_string()));
    }

    #[tokio::test]
    async fn test_get_preferences_by_prefix() {
        let db = test_db().await;
        db.set_preference("feed.last_url", "https://example.com/rss")
            .await
            .unwrap();
        db.set_preference("feed.interval", "30").await.unwrap();
        db.set_preference("list.width", "60").await.unwrap();

        let feed_prefs = db.get_preferences_by_prefix("feed.").await.unwrap();
        assert_eq!(
            feed_prefs,
            vec![
                ("feed.interval".to_string(), "30".to_string()),
                (
                    "feed.last_url".to_string(),
                    "https://example.com/rss".to_string()
                ),
            ]
        );
    }

    #[tokio::test]
    async fn test_get_preferences_by_prefix_no_false_matches() {
        let db = test_db().await;
        db.set_preference("feed.last_url", "a").await.unwrap();
        db.set_preference("feedback.sent", "b").await.unwrap();
        db.set_preference("feedXlast", "c").await.unwrap();

        // "." and "_" are not wildcards
        let prefs = db.get_preferences_by_prefix("feed.").await.unwrap();
        assert_eq!(prefs.len(), 1);
        assert_eq!(prefs[0].0, "feed.last_url");

        db.set_preference("a_b", "1").await.unwrap();
        db.set_preference("axb", "2").await.unwrap();
        let prefs = db.get_preferences_by_prefix("a_").await.unwrap();
        assert_eq!(prefs, vec![("a_b".to_string(), "1".to_string())]);
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("feed."), "feed.");
        assert_eq!(escape_like("50%_"), "50\\%\\_");
        assert_eq!(escape_like("a\\b"), "a\\\\b");
    }
}
