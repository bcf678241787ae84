use common::retry::RetryAttempt;
use common::{DlqEnvelope, DlqErrorCode, IngestionMessage};
use mq::{Producer, Topic};
use worker::Settled;

use crate::common::{TestApp, routes};

/// Publish a message the consumer must dead-letter, and persist it.
async fn poison(app: &TestApp, filename: &str, payload: Vec<u8>) -> IngestionMessage {
    let message = IngestionMessage::new(filename, payload, None);
    app.publish(&message).await;

    let settled = app.process().await;
    assert_eq!(
        settled,
        vec![Settled::DeadLettered(DlqErrorCode::MalformedMessage)]
    );
    message
}

#[tokio::test]
async fn undecodable_text_lands_in_dlq() {
    let app = TestApp::spawn().await;
    let admin = app.admin_token();
    let message = poison(&app, "bad.txt", vec![0xff, 0xfe]).await;

    let res = app.get_with_token(routes::DLQ, &admin).await;
    assert_eq!(res.status, 200, "{}", res.text);
    assert_eq!(res.body["pagination"]["total"], 1);
    let entry = &res.body["data"][0];
    assert_eq!(entry["message_id"], message.id.to_string());
    assert_eq!(entry["filename"], "bad.txt");
    assert_eq!(entry["error_code"], "MALFORMED_MESSAGE");
    assert_eq!(entry["resolved"], false);

    // Nothing was written for the key.
    let res = app
        .get_with_token(&routes::content("bad.txt"), &app.user_token())
        .await;
    assert_eq!(res.status, 404);
}

#[tokio::test]
async fn invalid_key_lands_in_dlq() {
    let app = TestApp::spawn().await;
    let admin = app.admin_token();
    poison(&app, "../escape.bin", vec![1, 2, 3]).await;

    let res = app.get_with_token(routes::DLQ, &admin).await;
    assert_eq!(res.body["data"][0]["filename"], "../escape.bin");
    assert_eq!(res.body["data"][0]["error_code"], "MALFORMED_MESSAGE");
}

#[tokio::test]
async fn get_and_resolve() {
    let app = TestApp::spawn().await;
    let admin = app.admin_token();
    poison(&app, "bad.txt", vec![0xc3, 0x28]).await;

    let list = app.get_with_token(routes::DLQ, &admin).await;
    let id = list.body["data"][0]["id"].as_i64().unwrap() as i32;

    let res = app.get_with_token(&routes::dlq_message(id), &admin).await;
    assert_eq!(res.status, 200, "{}", res.text);
    assert_eq!(res.body["filename"], "bad.txt");
    assert!(res.body["payload"].is_object());
    assert!(res.body["retry_history"].is_array());

    let res = app.post_with_token(&routes::dlq_resolve(id), &admin).await;
    assert_eq!(res.status, 204, "{}", res.text);
    // Resolving twice is harmless.
    let res = app.post_with_token(&routes::dlq_resolve(id), &admin).await;
    assert_eq!(res.status, 204);

    let res = app.get_with_token(&routes::dlq_message(id), &admin).await;
    assert_eq!(res.body["resolved"], true);
    assert!(res.body["resolved_by"].is_string());

    let res = app
        .get_with_token(&format!("{}?resolved=false", routes::DLQ), &admin)
        .await;
    assert_eq!(res.body["pagination"]["total"], 0);
    let res = app
        .get_with_token(&format!("{}?resolved=true", routes::DLQ), &admin)
        .await;
    assert_eq!(res.body["pagination"]["total"], 1);
}

#[tokio::test]
async fn unknown_id_is_not_found() {
    let app = TestApp::spawn().await;
    let admin = app.admin_token();

    let res = app.get_with_token(&routes::dlq_message(9999), &admin).await;
    assert_eq!(res.status, 404);
    let res = app.post_with_token(&routes::dlq_resolve(9999), &admin).await;
    assert_eq!(res.status, 404);
}

#[tokio::test]
async fn dlq_requires_admin() {
    let app = TestApp::spawn().await;
    let user = app.user_token();

    let res = app.get_with_token(routes::DLQ, &user).await;
    assert_eq!(res.status, 403);
    assert_eq!(res.code(), "PERMISSION_DENIED");

    let res = app.post_with_token(&routes::dlq_resolve(1), &user).await;
    assert_eq!(res.status, 403);

    let res = app.get_without_token(routes::DLQ).await;
    assert_eq!(res.status, 401);
}

#[tokio::test]
async fn redelivered_envelope_is_stored_once() {
    let app = TestApp::spawn().await;
    let admin = app.admin_token();

    let message = IngestionMessage::new("flaky.bin", vec![9; 4], None);
    let envelope = DlqEnvelope {
        message_id: message.id.to_string(),
        filename: Some(message.filename.clone()),
        payload: serde_json::to_value(&message).unwrap(),
        error_code: DlqErrorCode::MaxRetriesExceeded,
        error_message: "backend unavailable: connection refused".into(),
        retry_history: vec![
            RetryAttempt::new(1, "connection refused"),
            RetryAttempt::new(2, "connection refused"),
            RetryAttempt::new(3, "connection refused"),
        ],
    };

    let producer = Producer::new(
        app.broker.clone(),
        Topic::new(&app.config.mq.dlq_topic, 1),
        app.config.storage.call_timeout(),
    );
    producer.send(&envelope).await.unwrap();
    producer.send(&envelope).await.unwrap();
    assert_eq!(app.dlq_sink.drain().await.unwrap(), 2);

    let res = app.get_with_token(routes::DLQ, &admin).await;
    assert_eq!(res.body["pagination"]["total"], 1);
    let entry = &res.body["data"][0];
    assert_eq!(entry["error_code"], "MAX_RETRIES_EXCEEDED");
    assert_eq!(entry["retry_count"], 3);
    assert_eq!(entry["filename"], "flaky.bin");
}
