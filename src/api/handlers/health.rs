use crate::AppState;
use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub regions: usize,
    pub usable_regions: usize,
    pub version: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Process liveness", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let registry = state.store.registry();

    Json(HealthResponse {
        status: "ok".to_string(),
        regions: registry.len(),
        usable_regions: registry.usable_count(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
