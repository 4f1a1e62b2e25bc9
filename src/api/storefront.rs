//! Storefront-facing routes: funnel events and on-site campaign lookup

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::domain::{FunnelKind, FunnelOutcome, RecordEventRequest};
use crate::events::Event;
use crate::funnel::{self, OnsiteCampaign};

use super::{ApiResponse, AppError, AppState};

pub fn storefront_routes() -> Router<AppState> {
    Router::new()
        .route("/funnel-events", post(record_event))
        .route("/storefront/campaigns", get(onsite_campaigns))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordEventResponse {
    pub event_id: String,
    pub target_id: String,
    #[serde(flatten)]
    pub outcome: FunnelOutcome,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnsiteQuery {
    pub path: Option<String>,
    pub customer_id: Option<String>,
    pub visitor_id: Option<String>,
}

async fn record_event(
    State(state): State<AppState>,
    Json(req): Json<RecordEventRequest>,
) -> Result<Json<ApiResponse<RecordEventResponse>>, AppError> {
    let kind = req.kind;
    let recorded = funnel::record_event(&state.pool, req).await?;

    if kind == FunnelKind::Order && recorded.outcome.converted {
        state.event_bus.publish(Event::TargetConverted {
            campaign_id: recorded.target.campaign_id.clone(),
            target_id: recorded.target.id.clone(),
            order_id: recorded.target.conversion_order_id.clone().unwrap_or_default(),
            timestamp: Utc::now(),
        });
    }

    Ok(Json(ApiResponse::new(RecordEventResponse {
        event_id: recorded.event_id,
        target_id: recorded.target.id,
        outcome: recorded.outcome,
    })))
}

async fn onsite_campaigns(
    State(state): State<AppState>,
    Query(query): Query<OnsiteQuery>,
) -> Result<Json<ApiResponse<Vec<OnsiteCampaign>>>, AppError> {
    let path = query.path.as_deref().unwrap_or("/");
    let campaigns = funnel::onsite_campaigns(
        &state.pool,
        path,
        query.customer_id.as_deref(),
        query.visitor_id.as_deref(),
    )
    .await?;

    Ok(Json(ApiResponse::new(campaigns)))
}
