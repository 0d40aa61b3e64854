use crate::config::app::AppConfig;
use crate::response::ApiResponse;
use crate::store::Store;
use axum::{response::IntoResponse, Extension};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `ok`, or `degraded` when the backing store does not answer
    pub status: String,
    pub environment: String,
    /// `postgres`, `dynamodb` or `memory`
    pub database: String,
    pub database_reachable: bool,
    pub version: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service status", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health_check(
    Extension(store): Extension<Store>,
    Extension(config): Extension<AppConfig>,
) -> impl IntoResponse {
    let reachable = store.is_reachable().await;

    ApiResponse::ok(
        "Service is running",
        HealthResponse {
            status: if reachable { "ok" } else { "degraded" }.to_string(),
            environment: config.environment.as_str().to_string(),
            database: store.kind().as_str().to_string(),
            database_reachable: reachable,
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
    )
}
