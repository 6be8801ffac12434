//! Feed ingestion against mock feed servers.

use std::time::Duration;

use content_promoter::db::{get_content_item, list_content_created_since, Database};
use content_promoter::feeds::{ingest_batch, ingest_feed, FeedKind, FeedNormalizer, FeedSource};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn setup_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test.sqlite");
    let db = Database::new(&db_path)
        .await
        .expect("Failed to create database");
    (db, temp_dir)
}

fn normalizer() -> FeedNormalizer {
    FeedNormalizer::new(Duration::from_secs(5)).expect("Failed to build normalizer")
}

fn rss(items: &[(&str, &str)]) -> String {
    let mut body = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel><title>Engineering Blog</title><link>https://blog.example.com</link>"#,
    );
    for (title, link) in items {
        body.push_str(&format!(
            "<item><title>{title}</title><link>{link}</link>\
             <description>&lt;p&gt;About {title}&lt;/p&gt;</description>\
             <pubDate>Mon, 03 Jun 2024 10:00:00 GMT</pubDate></item>"
        ));
    }
    body.push_str("</channel></rss>");
    body
}

async fn mount_feed(server: &MockServer, feed_path: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(feed_path))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/rss+xml")
                .set_body_string(body),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_ingest_stores_new_items_once() {
    let (db, _temp_dir) = setup_db().await;
    let server = MockServer::start().await;
    mount_feed(
        &server,
        "/feed.xml",
        rss(&[
            ("Scaling Postgres", "https://blog.example.com/scaling-postgres"),
            ("Rust at Work", "https://blog.example.com/rust-at-work"),
        ]),
    )
    .await;

    let source = FeedSource::new(format!("{}/feed.xml", server.uri()), FeedKind::Blog);
    let first = ingest_feed(&db, &normalizer(), &source)
        .await
        .expect("First ingest failed");
    assert_eq!(first.seen, 2);
    assert_eq!(first.created, 2);
    assert_eq!(first.content_ids.len(), 2);

    let second = ingest_feed(&db, &normalizer(), &source)
        .await
        .expect("Second ingest failed");
    assert_eq!(second.seen, 2);
    assert_eq!(second.created, 0);
    assert_eq!(second.skipped, 2);

    let all = list_content_created_since(db.pool(), "2000-01-01T00:00:00Z")
        .await
        .expect("Failed to list content");
    assert_eq!(all.len(), 2);

    let item = get_content_item(db.pool(), first.content_ids[0])
        .await
        .expect("Failed to load item")
        .expect("Item missing");
    assert_eq!(item.title, "Scaling Postgres");
    assert_eq!(item.excerpt.as_deref(), Some("About Scaling Postgres"));
    assert_eq!(item.kind, "article");
    assert_eq!(item.published_at.as_deref(), Some("2024-06-03T10:00:00Z"));
}

#[tokio::test]
async fn test_tracking_variants_are_one_item() {
    let (db, _temp_dir) = setup_db().await;
    let server = MockServer::start().await;
    mount_feed(
        &server,
        "/a.xml",
        rss(&[("Launch", "https://blog.example.com/launch")]),
    )
    .await;
    mount_feed(
        &server,
        "/b.xml",
        rss(&[(
            "Launch again",
            "https://blog.example.com/launch?utm_source=newsletter&amp;utm_medium=email",
        )]),
    )
    .await;

    let batch = ingest_batch(
        &db,
        &normalizer(),
        &[
            FeedSource::new(format!("{}/a.xml", server.uri()), FeedKind::Blog),
            FeedSource::new(format!("{}/b.xml", server.uri()), FeedKind::Blog),
        ],
    )
    .await;

    assert!(batch.failures.is_empty());
    assert_eq!(batch.created(), 1);
    assert_eq!(batch.reports[1].skipped, 1);
}

#[tokio::test]
async fn test_batch_continues_past_malformed_feed() {
    let (db, _temp_dir) = setup_db().await;
    let server = MockServer::start().await;
    mount_feed(&server, "/one.xml", rss(&[("One", "https://one.example.com/post")])).await;
    mount_feed(&server, "/two.xml", rss(&[("Two", "https://two.example.com/post")])).await;
    mount_feed(
        &server,
        "/broken.xml",
        "this is not a feed at all".to_string(),
    )
    .await;
    mount_feed(
        &server,
        "/three.xml",
        rss(&[("Three", "https://three.example.com/post")]),
    )
    .await;

    let broken_url = format!("{}/broken.xml", server.uri());
    let sources = vec![
        FeedSource::new(format!("{}/one.xml", server.uri()), FeedKind::Blog),
        FeedSource::new(format!("{}/two.xml", server.uri()), FeedKind::Podcast),
        FeedSource::new(broken_url.clone(), FeedKind::Blog),
        FeedSource::new(format!("{}/three.xml", server.uri()), FeedKind::Video),
    ];

    let batch = ingest_batch(&db, &normalizer(), &sources).await;

    assert_eq!(batch.failures.len(), 1);
    assert_eq!(batch.failures[0].feed_url, broken_url);
    assert_eq!(batch.reports.len(), 3);
    assert_eq!(batch.created(), 3);
}

#[tokio::test]
async fn test_unreachable_feed_is_feed_unavailable() {
    let (db, _temp_dir) = setup_db().await;
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone.xml"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let source = FeedSource::new(format!("{}/gone.xml", server.uri()), FeedKind::Blog);
    let err = ingest_feed(&db, &normalizer(), &source)
        .await
        .expect_err("A 404 feed should fail");
    assert_eq!(err.code(), "feed_unavailable");
}
