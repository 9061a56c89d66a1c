//! End-to-end tests: download a feed from a mock server, parse it, store it,
//! and read it back.
//!
//! Each test creates its own in-memory SQLite database for isolation.

use feedpull::feed::{fetch_articles, FetchOptions};
use feedpull::storage::{Database, LAST_FEED_URL};
use pretty_assertions::assert_eq;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FEED_V1: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <title>Example</title>
    <item>
        <title>First</title>
        <description>Original text</description>
        <pubDate>Mon, 01 Jan 2023 00:00:00 GMT</pubDate>
        <link>https://example.com/first</link>
    </item>
    <item>
        <title>Second</title>
        <link>https://example.com/second</link>
    </item>
</channel></rss>"#;

const FEED_V2: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <item>
        <title>First (edited)</title>
        <link>https://example.com/first</link>
    </item>
    <item>
        <title>Third</title>
        <link>https://example.com/third</link>
    </item>
</channel></rss>"#;

async fn test_db() -> Database {
    Database::open(":memory:").await.unwrap()
}

fn options() -> FetchOptions {
    FetchOptions {
        timeout: Duration::from_secs(5),
        base_delay: Duration::from_millis(1),
        ..FetchOptions::default()
    }
}

async fn serve(body: &'static str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rss"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_fetch_parse_store_list() {
    let server = serve(FEED_V1).await;
    let url = format!("{}/rss", server.uri());
    let db = test_db().await;
    let client = reqwest::Client::new();

    let articles = fetch_articles(&client, &url, &options()).await.unwrap();
    assert_eq!(articles.len(), 2);

    let inserted = db.upsert_articles(Some(&url), &articles).await.unwrap();
    assert_eq!(inserted, 2);

    let stored = db.get_all_articles().await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].title.as_deref(), Some("First"));
    assert_eq!(stored[0].feed_url.as_deref(), Some(url.as_str()));
    assert_eq!(stored[1].title.as_deref(), Some("Second"));
    assert_eq!(stored[1].description, None);
    assert_eq!(stored[1].pub_date, None);

    let round_tripped: Vec<_> = stored.into_iter().map(|s| s.into_article()).collect();
    assert_eq!(round_tripped, articles);
}

#[tokio::test]
async fn test_refetch_replaces_existing_articles() {
    let db = test_db().await;
    let client = reqwest::Client::new();

    let first = serve(FEED_V1).await;
    let articles = fetch_articles(&client, &format!("{}/rss", first.uri()), &options())
        .await
        .unwrap();
    db.upsert_articles(None, &articles).await.unwrap();

    let second = serve(FEED_V2).await;
    let articles = fetch_articles(&client, &format!("{}/rss", second.uri()), &options())
        .await
        .unwrap();
    let inserted = db.upsert_articles(None, &articles).await.unwrap();

    // "first" is replaced, "third" is new, "second" is untouched
    assert_eq!(inserted, 1);
    assert_eq!(db.article_count().await.unwrap(), 3);

    let stored = db.get_all_articles().await.unwrap();
    let first = stored
        .iter()
        .find(|a| a.guid == "https://example.com/first")
        .unwrap();
    assert_eq!(first.title.as_deref(), Some("First (edited)"));
    // Replace semantics: fields missing from the new copy are cleared
    assert_eq!(first.description, None);
    assert_eq!(first.pub_date, None);
}

#[tokio::test]
async fn test_delete_after_fetch() {
    let server = serve(FEED_V1).await;
    let db = test_db().await;
    let client = reqwest::Client::new();

    let articles = fetch_articles(&client, &format!("{}/rss", server.uri()), &options())
        .await
        .unwrap();
    db.upsert_articles(None, &articles).await.unwrap();

    let id = db.get_all_articles().await.unwrap()[0].id;
    assert!(db.delete_article(id).await.unwrap());

    let remaining = db.get_all_articles().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].title.as_deref(), Some("Second"));
}

#[tokio::test]
async fn test_last_feed_url_preference() {
    let db = test_db().await;
    assert_eq!(db.get_preference(LAST_FEED_URL).await.unwrap(), None);

    db.set_preference(LAST_FEED_URL, "https://example.com/rss")
        .await
        .unwrap();
    assert_eq!(
        db.get_preference(LAST_FEED_URL).await.unwrap().as_deref(),
        Some("https://example.com/rss")
    );
}
