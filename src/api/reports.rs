//! Campaign report route

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::domain::{CampaignReport, ReportWindow};
use crate::reports;

use super::{ApiResponse, AppError, AppState};

pub fn report_routes() -> Router<AppState> {
    Router::new().route("/:campaign_id/report", get(get_report))
}

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    pub window: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

async fn get_report(
    State(state): State<AppState>,
    Path(campaign_id): Path<String>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<ApiResponse<CampaignReport>>, AppError> {
    let window = match query.window.as_deref() {
        Some(w) => w.parse::<ReportWindow>().map_err(AppError::BadRequest)?,
        None => ReportWindow::default(),
    };

    let report = reports::report(&state.pool, &campaign_id, window, query.from, query.to).await?;
    Ok(Json(ApiResponse::new(report)))
}
