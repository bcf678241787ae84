use serde::Serialize;

/// Backend reachability.
#[derive(Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    /// `ok` when every backend answered, `degraded` otherwise.
    #[schema(example = "ok")]
    pub status: &'static str,
    #[schema(example = true)]
    pub database: bool,
    #[schema(example = true)]
    pub text_store: bool,
}
