use crate::common::{TestApp, routes};

#[tokio::test]
async fn health_needs_no_token() {
    let app = TestApp::spawn().await;

    let res = app.get_without_token(routes::HEALTH).await;
    assert_eq!(res.status, 200, "{}", res.text);
    assert_eq!(res.body["status"], "ok");
    assert_eq!(res.body["database"], true);
    assert_eq!(res.body["text_store"], true);
}

#[tokio::test]
async fn openapi_lists_content_routes() {
    let app = TestApp::spawn().await;

    let res = app.get_without_token("/api-docs/openapi.json").await;
    assert_eq!(res.status, 200);
    let paths = &res.body["paths"];
    assert!(paths["/api/v1/content"]["post"].is_object());
    assert!(paths["/api/v1/content/{filename}"]["get"].is_object());
    assert!(paths["/api/v1/content/{filename}"]["delete"].is_object());
    assert!(paths["/api/v1/dlq/{id}/resolve"]["post"].is_object());
}
