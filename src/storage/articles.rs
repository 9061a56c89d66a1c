use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{DatabaseError, StoredArticle};
use crate::feed::Article;

/// Maximum number of articles to return from any single query (OOM protection)
const MAX_ARTICLES: i64 = 2000;

/// 7 bound columns * 50 rows stays well under SQLite's 999 parameter limit
const BATCH_SIZE: usize = 50;

impl Database {
    // ========================================================================
    // Article Operations
    // ========================================================================

    /// Insert or replace articles keyed on [`Article::identity`], returns
    /// the number of articles that were not stored before.
    ///
    /// Replacing overwrites every stored field with the new values, unset
    /// fields included, and refreshes `fetched_at`. The row id is kept.
    /// Duplicates within one batch resolve to the last occurrence.
    ///
    /// Uses a two-phase write per batch: `INSERT OR IGNORE` counted via
    /// `changes()`, then an upsert that rewrites every row in the batch.
    pub async fn upsert_articles(
        &self,
        feed_url: Option<&str>,
        articles: &[Article],
    ) -> Result<usize, DatabaseError> {
        if articles.is_empty() {
            return Ok(0);
        }

        let now = chrono::Utc::now().timestamp();
        let keyed: Vec<(String, &Article)> = articles.iter().map(|a| (a.identity(), a)).collect();
        let mut tx = self.pool.begin().await?;
        let mut total_inserted: usize = 0;

        for chunk in keyed.chunks(BATCH_SIZE) {
            let mut insert_builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "INSERT OR IGNORE INTO articles (guid, title, description, pub_date, link, feed_url, fetched_at) ",
            );
            push_article_values(&mut insert_builder, chunk, feed_url, now);
            insert_builder.build().execute(&mut *tx).await?;

            let changes: (i64,) = sqlx::query_as("SELECT changes()")
                .fetch_one(&mut *tx)
                .await?;
            total_inserted += changes.0 as usize;

            let mut upsert_builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "INSERT INTO articles (guid, title, description, pub_date, link, feed_url, fetched_at) ",
            );
            push_article_values(&mut upsert_builder, chunk, feed_url, now);
            upsert_builder.push(
                " ON CONFLICT(guid) DO UPDATE SET \
                 title = excluded.title, \
                 description = excluded.description, \
                 pub_date = excluded.pub_date, \
                 link = excluded.link, \
                 feed_url = excluded.feed_url, \
                 fetched_at = excluded.fetched_at",
            );
            upsert_builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        tracing::debug!(
            total = articles.len(),
            inserted = total_inserted,
            "Stored articles"
        );
        Ok(total_inserted)
    }

    /// Insert or replace a single article, returns `true` if it was new.
    pub async fn insert_article(
        &self,
        article: &Article,
        feed_url: Option<&str>,
    ) -> Result<bool, DatabaseError> {
        let inserted = self
            .upsert_articles(feed_url, std::slice::from_ref(article))
            .await?;
        Ok(inserted == 1)
    }

    /// Delete an article by id, returns `true` if a row was removed.
    pub async fn delete_article(&self, article_id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM articles WHERE id = ?")
            .bind(article_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ========================================================================
    // Article Queries
    // ========================================================================

    /// All stored articles, most recently fetched first.
    ///
    /// Articles stored in the same upsert keep their insertion order.
    /// Capped at 2000 rows.
    pub async fn get_all_articles(&self) -> Result<Vec<StoredArticle>, DatabaseError> {
        let rows = sqlx::query_as::<_, StoredArticle>(
            r#"
            SELECT id, guid, title, description, pub_date, link, feed_url, fetched_at
            FROM articles
            ORDER BY fetched_at DESC, id ASC
            LIMIT ?
        "#,
        )
        .bind(MAX_ARTICLES)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Get a single article by id.
    pub async fn get_article_by_id(
        &self,
        article_id: i64,
    ) -> Result<Option<StoredArticle>, DatabaseError> {
        let row = sqlx::query_as::<_, StoredArticle>(
            r#"
            SELECT id, guid, title, description, pub_date, link, feed_url, fetched_at
            FROM articles
            WHERE id = ?
        "#,
        )
        .bind(article_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Number of stored articles.
    pub async fn article_count(&self) -> Result<i64, DatabaseError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM articles")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

fn push_article_values<'a>(
    builder: &mut QueryBuilder<'a, sqlx::Sqlite>,
    chunk: &'a [(String, &'a Article)],
    feed_url: Option<&'a str>,
    now: i64,
) {
    builder.push_values(chunk, |mut b, (guid, article)| {
        b.push_bind(guid.as_str())
            .push_bind(article.title.as_deref())
            .push_bind(article.description.as_deref())
            .push_bind(article.pub_date.as_deref())
            .push_bind(article.link.as_deref())
            .push_bind(feed_url)
            .push_bind(now);
    });
}
