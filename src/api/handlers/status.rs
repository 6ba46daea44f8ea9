use crate::AppState;
use crate::services::status_service::RegionStatus;
use axum::{Json, extract::State};

#[utoipa::path(
    get,
    path = "/databases",
    responses(
        (status = 200, description = "One entry per configured region, in configured order", body = Vec<RegionStatus>)
    ),
    tag = "regions"
)]
pub async fn list_databases(State(state): State<AppState>) -> Json<Vec<RegionStatus>> {
    Json(state.status_service.list_statuses().await)
}
