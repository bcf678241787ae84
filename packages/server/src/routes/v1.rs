use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::config::AppConfig;
use crate::handlers;
use crate::state::AppState;

pub fn routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .merge(content_routes(config))
        .merge(dlq_routes())
        .routes(routes!(handlers::health::health))
}

fn content_routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    let read = OpenApiRouter::new().routes(routes!(
        handlers::content::get_content,
        handlers::content::delete_content
    ));

    let upload = OpenApiRouter::new()
        .routes(routes!(handlers::content::upload_content))
        .layer(handlers::content::upload_body_limit(
            config.storage.max_payload_size,
        ));

    read.merge(upload)
}

fn dlq_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::dlq::list_dlq_messages))
        .routes(routes!(handlers::dlq::get_dlq_message))
        .routes(routes!(handlers::dlq::resolve_dlq_message))
}
