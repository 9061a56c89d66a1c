use serde::Serialize;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds the database lock
    #[error("The article database is locked by another process. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_message(&err.to_string()) {
            return DatabaseError::InstanceLocked;
        }
        DatabaseError::Other(err)
    }
}

/// SQLITE_BUSY (5), SQLITE_LOCKED (6) and SQLITE_CANTOPEN (14) all surface
/// as one of these messages.
pub(crate) fn is_lock_message(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
        || message.contains("sqlite_locked")
        || message.contains("unable to open database file")
}

// ============================================================================
// Data Structures
// ============================================================================

/// An article as persisted in the `articles` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct StoredArticle {
    pub id: i64,
    /// Identity key, see [`crate::feed::Article::identity`]
    pub guid: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub pub_date: Option<String>,
    pub link: Option<String>,
    /// Feed the article was fetched from, if known
    pub feed_url: Option<String>,
    /// Unix seconds of the last insert or replace
    pub fetched_at: i64,
}

impl StoredArticle {
    /// Drops the storage metadata and returns the parsed record.
    pub fn into_article(self) -> crate::feed::Article {
        crate::feed::Article {
            title: self.title,
            description: self.description,
            pub_date: self.pub_date,
            link: self.link,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_messages_detected() {
        assert!(is_lock_message("error returned from database: database is locked"));
        assert!(is_lock_message("SQLITE_BUSY"));
        assert!(is_lock_message("unable to open database file"));
        assert!(!is_lock_message("no such table: articles"));
    }

    #[test]
    fn test_into_article_keeps_fields() {
        let stored = StoredArticle {
            id: 7,
            guid: "https://example.com/a".to_string(),
            title: Some("A".to_string()),
            description: None,
            pub_date: Some("Mon, 01 Jan 2023 00:00:00 GMT".to_string()),
            link: Some("https://example.com/a".to_string()),
            feed_url: None,
            fetched_at: 1_700_000_000,
        };

        let article = stored.into_article();
        assert_eq!(article.title.as_deref(), Some("A"));
        assert_eq!(article.description, None);
        assert_eq!(article.link.as_deref(), Some("https://example.com/a"));
    }
}
