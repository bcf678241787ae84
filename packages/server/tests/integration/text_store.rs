use std::sync::Arc;

use common::store::mongo::MongoTextStore;
use common::store::{TextStore, TextUpsert};
use uuid::Uuid;

use crate::common::TestApp;

#[tokio::test]
async fn concurrent_upserts_keep_newest_revision() {
    let app = TestApp::spawn().await;
    let store = Arc::new(MongoTextStore::connect(&app.config.mongo).await.unwrap());

    let revisions: Vec<Uuid> = (0..8).map(|_| Uuid::now_v7()).collect();
    let newest = *revisions.iter().max().unwrap();

    // Newest first, so older writers race against a document that is
    // already ahead of them.
    let handles: Vec<_> = revisions
        .iter()
        .rev()
        .map(|&revision| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .upsert("race.txt", &revision.to_string(), revision)
                    .await
            })
        })
        .collect();

    for handle in handles {
        let outcome = handle.await.unwrap();
        assert!(
            matches!(outcome, Ok(TextUpsert::Written(_) | TextUpsert::Stale(_))),
            "{outcome:?}"
        );
    }

    let doc = store.get("race.txt").await.unwrap().unwrap();
    assert_eq!(doc.revision, newest);
    assert_eq!(doc.text, newest.to_string());
}

#[tokio::test]
async fn older_revision_is_stale_and_same_revision_is_idempotent() {
    let app = TestApp::spawn().await;
    let store = MongoTextStore::connect(&app.config.mongo).await.unwrap();
    let older = Uuid::now_v7();
    let newer = Uuid::now_v7();

    let first = match store.upsert("notes.txt", "new", newer).await.unwrap() {
        TextUpsert::Written(doc) => doc,
        other => panic!("expected Written, got {other:?}"),
    };

    match store.upsert("notes.txt", "old", older).await.unwrap() {
        TextUpsert::Stale(current) => assert_eq!(current.revision, newer),
        other => panic!("expected Stale, got {other:?}"),
    }

    match store.upsert("notes.txt", "new", newer).await.unwrap() {
        TextUpsert::Written(doc) => assert_eq!(doc.created_at, first.created_at),
        other => panic!("expected Written, got {other:?}"),
    }
    assert_eq!(store.get("notes.txt").await.unwrap().unwrap().text, "new");
}
