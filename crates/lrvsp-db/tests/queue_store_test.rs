//! Integration tests for the PostgreSQL queue store.
//!
//! This test suite validates:
//! - Fetch returns only unfailed rows, ordered and capped
//! - The write unit deletes, inserts the document, and inserts every link
//! - A failing write unit leaves no document or link rows behind
//! - Marked-failed rows are never fetched again
//! - Remaining counts per scope
//!
//! **IMPORTANT**: These tests require a reachable PostgreSQL server.
//! Set `DATABASE_URL` (or use the default test URL) and run with
//! `cargo test -p lrvsp-db -- --ignored`.

use lrvsp_core::{encode_title, EncodedDocument, QueueStore, RemainingScope};
use lrvsp_db::test_fixtures::TestDatabase;
use serde_json::json;

fn links(targets: &[&str]) -> Vec<String> {
    targets.iter().map(|t| t.to_string()).collect()
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_fetch_pending_filters_failed_and_limits() {
    dotenvy::dotenv().ok();
    let test_db = TestDatabase::new().await;
    let first = test_db.insert_item("/files/a.pdf", 1).await;
    let second = test_db.insert_item("/files/b.pdf", 2).await;
    test_db.insert_item("/files/c.pdf", 3).await;

    let store = test_db.store();
    let mut session = store.open_session().await.unwrap();
    session.mark_failed(first).await.unwrap();

    let items = session.fetch_pending(1).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, second);
    assert!(!items[0].failed);

    session.close().await.unwrap();
    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_commit_document_persists_all_rows() {
    dotenvy::dotenv().ok();
    let test_db = TestDatabase::new().await;
    let id = test_db.insert_item("/files/doc1.pdf", 7).await;

    let store = test_db.store();
    let mut session = store.open_session().await.unwrap();
    let item = session.fetch_pending(10).await.unwrap().remove(0);
    let document =
        EncodedDocument::encode("Doc1", &json!({}), item.entity_id, &links(&["Doc2", "Doc3"]))
            .unwrap();
    session.commit_document(&item, &document).await.unwrap();
    session.close().await.unwrap();

    assert!(test_db.item(id).await.is_none());
    let documents = test_db.documents().await;
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].title, encode_title("Doc1"));
    assert_eq!(documents[0].entity_id, 7);
    assert_eq!(documents[0].num_links, 2);

    let stored_links = test_db.links().await;
    assert_eq!(stored_links.len(), 2);
    assert!(stored_links
        .iter()
        .all(|link| link.from_title == encode_title("Doc1")));

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_commit_document_rolls_back_on_oversize_title() {
    dotenvy::dotenv().ok();
    let test_db = TestDatabase::new().await;
    let id = test_db.insert_item("/files/long.pdf", 7).await;

    let store = test_db.store();
    let mut session = store.open_session().await.unwrap();
    let item = session.fetch_pending(10).await.unwrap().remove(0);
    // 300 raw bytes encode to 400, wider than the title column
    let title = "t".repeat(300);
    let document =
        EncodedDocument::encode(&title, &json!({}), item.entity_id, &links(&["Doc2"])).unwrap();

    assert!(session.commit_document(&item, &document).await.is_err());
    session.mark_failed(item.id).await.unwrap();
    session.close().await.unwrap();

    let row = test_db.item(id).await.expect("item should still exist");
    assert!(row.failed);
    assert!(test_db.documents().await.is_empty());
    assert!(test_db.links().await.is_empty());

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_commit_document_fails_for_vanished_item() {
    dotenvy::dotenv().ok();
    let test_db = TestDatabase::new().await;
    test_db.insert_item("/files/gone.pdf", 7).await;

    let store = test_db.store();
    let mut session = store.open_session().await.unwrap();
    let item = session.fetch_pending(10).await.unwrap().remove(0);
    sqlx::query(r#"DELETE FROM "FilePaths" WHERE id = $1"#)
        .bind(item.id)
        .execute(&test_db.pool)
        .await
        .unwrap();

    let document = EncodedDocument::encode("Gone", &json!({}), 7, &links(&[])).unwrap();
    assert!(session.commit_document(&item, &document).await.is_err());
    session.close().await.unwrap();

    assert!(test_db.documents().await.is_empty());
    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_remaining_count_scopes() {
    dotenvy::dotenv().ok();
    let test_db = TestDatabase::new().await;
    test_db.insert_item("/files/a.pdf", 1).await;
    test_db.insert_item("/files/b.pdf", 2).await;

    let store = test_db.store();
    let mut session = store.open_session().await.unwrap();
    let item = session.fetch_pending(1).await.unwrap().remove(0);
    let document =
        EncodedDocument::encode("A", &json!({}), item.entity_id, &links(&["B"])).unwrap();
    session.commit_document(&item, &document).await.unwrap();

    assert_eq!(
        session.remaining_count(RemainingScope::Queue).await.unwrap(),
        1
    );
    assert_eq!(session.remaining_count(RemainingScope::All).await.unwrap(), 3);

    session.close().await.unwrap();
    test_db.cleanup().await;
}
