//! Target listing and operator actions

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};

use crate::domain::{Target, TargetListParams, TargetPage};
use crate::reports;
use crate::state_machine;

use super::{ApiResponse, AppError, AppState};

/// Create target routes, nested under a campaign
pub fn target_routes() -> Router<AppState> {
    Router::new()
        .route("/:campaign_id/targets", get(list_targets))
        .route("/:campaign_id/targets/:target_id/skip", post(skip_target))
}

async fn list_targets(
    State(state): State<AppState>,
    Path(campaign_id): Path<String>,
    Query(params): Query<TargetListParams>,
) -> Result<Json<ApiResponse<TargetPage>>, AppError> {
    let page = reports::list_targets(&state.pool, &campaign_id, params).await?;
    Ok(Json(ApiResponse::new(page)))
}

async fn skip_target(
    State(state): State<AppState>,
    Path((campaign_id, target_id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<Target>>, AppError> {
    let target = state_machine::skip_target(&state.pool, &campaign_id, &target_id).await?;
    Ok(Json(ApiResponse::new(target)))
}
