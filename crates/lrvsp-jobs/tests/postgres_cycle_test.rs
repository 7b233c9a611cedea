//! Full cycle against PostgreSQL.
//!
//! **IMPORTANT**: These tests require a reachable PostgreSQL server.
//! Set `DATABASE_URL` and run with `cargo test -p lrvsp-jobs -- --ignored`.

use std::sync::Arc;

use serde_json::json;

use lrvsp_db::test_fixtures::TestDatabase;
use lrvsp_jobs::testing::{RecordingNotifier, StaticExtractor};
use lrvsp_jobs::{
    decode_title, CycleScheduler, ExtractionRegistry, ItemProcessor, RemainingScope,
    SchedulerConfig,
};

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_cycle_commits_and_fails_items() {
    dotenvy::dotenv().ok();
    let test_db = TestDatabase::new().await;
    let good = test_db.insert_item("/files/Doc1.pdf", 11).await;
    let bad = test_db.insert_item("/files/report.csv", 12).await;

    let registry = ExtractionRegistry::new().with(
        "pdf",
        Arc::new(StaticExtractor::structured(
            json!({"name": "Doc1", "metadata": {"pages": 2}, "links": ["Doc2", "Doc3"]}),
        )),
    );
    let notifier = RecordingNotifier::new();
    let scheduler = CycleScheduler::new(
        Arc::new(test_db.store()),
        ItemProcessor::new(registry),
        Arc::new(notifier.clone()),
    )
    .with_config(SchedulerConfig::default().with_remaining_scope(RemainingScope::All));

    let report = scheduler.run_cycle().await.unwrap();

    assert_eq!(report.fetched, 2);
    assert_eq!(report.committed, 1);
    assert_eq!(report.failed, 1);
    // one document plus two links wait for the content system
    assert_eq!(report.remaining, 3);
    assert_eq!(notifier.calls(), 1);

    assert!(test_db.item(good).await.is_none());
    assert!(test_db.item(bad).await.unwrap().failed);

    let documents = test_db.documents().await;
    assert_eq!(documents.len(), 1);
    assert_eq!(decode_title(&documents[0].title).unwrap(), "Doc1");
    assert_eq!(documents[0].num_links, 2);
    assert_eq!(test_db.links().await.len(), 2);

    test_db.cleanup().await;
}
