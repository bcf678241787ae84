use common::IngestionMessage;
use common::storage::ContentHash;
use worker::{Committed, Settled};

use crate::common::{MAX_PAYLOAD, TestApp, routes};

#[tokio::test]
async fn text_round_trip() {
    let app = TestApp::spawn().await;
    let token = app.user_token();

    let res = app.upload("report.txt", b"hello".to_vec(), Some(&token)).await;
    assert_eq!(res.status, 202, "{}", res.text);
    assert_eq!(res.body["filename"], "report.txt");
    assert_eq!(res.body["class"], "text");
    assert!(res.body["message_id"].is_string());

    let settled = app.process().await;
    assert_eq!(settled, vec![Settled::Committed(Committed::TextStored)]);

    let res = app.get_with_token(&routes::content("report.txt"), &token).await;
    assert_eq!(res.status, 200, "{}", res.text);
    assert_eq!(res.text, "hello");
    assert_eq!(res.header("x-content-class"), Some("text"));
    assert!(
        res.header("content-type")
            .is_some_and(|v| v.starts_with("text/plain"))
    );
}

#[tokio::test]
async fn blob_round_trip_with_checksum() {
    let app = TestApp::spawn().await;
    let token = app.user_token();
    let bytes: Vec<u8> = (0..1024u32).map(|i| (i % 251) as u8).collect();

    let res = app.upload("photo.png", bytes.clone(), Some(&token)).await;
    assert_eq!(res.status, 202, "{}", res.text);
    assert_eq!(res.body["class"], "blob");
    app.process().await;

    let res = app.get_with_token(&routes::content("photo.png"), &token).await;
    assert_eq!(res.status, 200, "{}", res.text);
    assert_eq!(res.bytes, bytes);
    assert_eq!(res.header("content-type"), Some("image/png"));
    assert_eq!(res.header("x-content-class"), Some("blob"));
    let checksum = ContentHash::compute(&bytes).to_hex();
    assert_eq!(res.header("x-content-checksum"), Some(checksum.as_str()));
}

#[tokio::test]
async fn matching_etag_returns_not_modified() {
    let app = TestApp::spawn().await;
    let token = app.user_token();
    app.store("photo.png", vec![7; 64], &token).await;

    let first = app.get_with_token(&routes::content("photo.png"), &token).await;
    let etag = first.header("etag").expect("etag header").to_string();

    let res = app
        .get_if_none_match(&routes::content("photo.png"), &etag, &token)
        .await;
    assert_eq!(res.status, 304);
    assert!(res.bytes.is_empty());

    let res = app
        .get_if_none_match(&routes::content("photo.png"), "\"stale\"", &token)
        .await;
    assert_eq!(res.status, 200);
}

#[tokio::test]
async fn unprocessed_upload_is_not_found() {
    let app = TestApp::spawn().await;
    let token = app.user_token();

    let res = app.upload("draft.txt", b"pending".to_vec(), Some(&token)).await;
    assert_eq!(res.status, 202);
    assert_eq!(app.broker.pending_in_topic(&app.config.mq.topic).await, 1);

    let res = app.get_with_token(&routes::content("draft.txt"), &token).await;
    assert_eq!(res.status, 404);
    assert_eq!(res.code(), "NOT_FOUND");
}

#[tokio::test]
async fn delete_missing_is_not_found() {
    let app = TestApp::spawn().await;
    let token = app.user_token();

    let res = app
        .delete_with_token(&routes::content("missing.bin"), &token)
        .await;
    assert_eq!(res.status, 404);
    assert_eq!(res.code(), "NOT_FOUND");

    let res = app
        .delete_with_token(&routes::content("missing.txt"), &token)
        .await;
    assert_eq!(res.status, 404);
}

#[tokio::test]
async fn delete_then_fetch_is_not_found() {
    let app = TestApp::spawn().await;
    let token = app.user_token();
    app.store("notes.txt", b"remember".to_vec(), &token).await;
    app.store("archive.zip", vec![1, 2, 3], &token).await;

    for name in ["notes.txt", "archive.zip"] {
        let res = app.delete_with_token(&routes::content(name), &token).await;
        assert_eq!(res.status, 204, "{name}: {}", res.text);

        let res = app.get_with_token(&routes::content(name), &token).await;
        assert_eq!(res.status, 404, "{name}");

        let res = app.delete_with_token(&routes::content(name), &token).await;
        assert_eq!(res.status, 404, "{name}");
    }
}

#[tokio::test]
async fn reupload_replaces_content() {
    let app = TestApp::spawn().await;
    let token = app.user_token();

    app.store("data.bin", vec![1; 32], &token).await;
    app.store("data.bin", vec![2; 48], &token).await;
    app.store("log.txt", b"first".to_vec(), &token).await;
    app.store("log.txt", b"second".to_vec(), &token).await;

    let res = app.get_with_token(&routes::content("data.bin"), &token).await;
    assert_eq!(res.bytes, vec![2; 48]);
    let res = app.get_with_token(&routes::content("log.txt"), &token).await;
    assert_eq!(res.text, "second");
}

#[tokio::test]
async fn queued_uploads_apply_in_order() {
    let app = TestApp::spawn().await;
    let token = app.user_token();

    for body in ["one", "two", "three"] {
        let res = app.upload("seq.txt", body.as_bytes().to_vec(), Some(&token)).await;
        assert_eq!(res.status, 202);
    }
    app.process().await;

    let res = app.get_with_token(&routes::content("seq.txt"), &token).await;
    assert_eq!(res.text, "three");
}

#[tokio::test]
async fn older_message_does_not_overwrite_newer() {
    let app = TestApp::spawn().await;
    let token = app.user_token();

    let older = IngestionMessage::new("race.bin", vec![1; 8], None);
    let newer = IngestionMessage::new("race.bin", vec![2; 8], None);
    app.publish(&newer).await;
    app.publish(&older).await;

    let settled = app.process().await;
    assert_eq!(settled.len(), 2);
    assert_eq!(settled[1], Settled::Committed(Committed::Stale));

    let res = app.get_with_token(&routes::content("race.bin"), &token).await;
    assert_eq!(res.bytes, vec![2; 8]);
}

#[tokio::test]
async fn invalid_filenames_are_rejected() {
    let app = TestApp::spawn().await;
    let token = app.user_token();

    for name in ["a/b.txt", "..", ".hidden.png", "dir\\x.bin"] {
        let res = app.upload_as(name, b"x".to_vec(), &token).await;
        assert_eq!(res.status, 400, "{name:?}: {}", res.text);
        assert_eq!(res.code(), "VALIDATION_ERROR");
    }

    let res = app.get_with_token(&routes::content("a%2Fb.txt"), &token).await;
    assert_eq!(res.status, 400);
    let res = app
        .delete_with_token(&routes::content("a%5Cb.bin"), &token)
        .await;
    assert_eq!(res.status, 400);
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let app = TestApp::spawn().await;
    let token = app.user_token();

    let res = app
        .upload("big.bin", vec![0; MAX_PAYLOAD as usize + 1], Some(&token))
        .await;
    assert_eq!(res.status, 413, "{}", res.text);
    assert_eq!(res.code(), "PAYLOAD_TOO_LARGE");

    let res = app
        .upload("exact.bin", vec![0; MAX_PAYLOAD as usize], Some(&token))
        .await;
    assert_eq!(res.status, 202, "{}", res.text);
    assert_eq!(app.broker.pending_in_topic(&app.config.mq.topic).await, 1);
}

#[tokio::test]
async fn non_utf8_text_is_rejected() {
    let app = TestApp::spawn().await;
    let token = app.user_token();

    let res = app.upload("bad.txt", vec![0xff, 0xfe, 0x00], Some(&token)).await;
    assert_eq!(res.status, 400);
    assert_eq!(res.code(), "VALIDATION_ERROR");

    // The same bytes are fine as a blob.
    let res = app.upload("bad.bin", vec![0xff, 0xfe, 0x00], Some(&token)).await;
    assert_eq!(res.status, 202);
}

#[tokio::test]
async fn empty_payload_round_trips() {
    let app = TestApp::spawn().await;
    let token = app.user_token();
    app.store("empty.txt", Vec::new(), &token).await;
    app.store("empty.bin", Vec::new(), &token).await;

    let res = app.get_with_token(&routes::content("empty.txt"), &token).await;
    assert_eq!(res.status, 200);
    assert!(res.bytes.is_empty());
    let res = app.get_with_token(&routes::content("empty.bin"), &token).await;
    assert_eq!(res.status, 200);
    assert!(res.bytes.is_empty());
}

#[tokio::test]
async fn requests_need_a_valid_token() {
    let app = TestApp::spawn().await;

    let res = app.upload("report.txt", b"hello".to_vec(), None).await;
    assert_eq!(res.status, 401);
    assert_eq!(res.code(), "TOKEN_MISSING");

    let res = app.get_without_token(&routes::content("report.txt")).await;
    assert_eq!(res.status, 401);

    let res = app
        .get_with_token(&routes::content("report.txt"), "not-a-token")
        .await;
    assert_eq!(res.status, 401);
    assert_eq!(res.code(), "TOKEN_INVALID");

    assert_eq!(app.broker.pending_in_topic(&app.config.mq.topic).await, 0);
}
