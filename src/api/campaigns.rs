//! Campaign API routes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::domain::{Campaign, CampaignSpec, CampaignStatus, RefreshResult, UpdateCampaignRequest};
use crate::events::Event;
use crate::state_machine::{self, CreatedCampaign};
use crate::targeting;

use super::{ApiResponse, AppError, AppState};

/// Create campaign routes
pub fn campaign_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_campaigns).post(create_campaign))
        .route(
            "/:campaign_id",
            get(get_campaign).patch(update_campaign).delete(delete_campaign),
        )
        .route("/:campaign_id/refresh-targets", post(refresh_targets))
        .route("/:campaign_id/build-targets", post(build_targets))
        .route("/:campaign_id/attach-new-viewers", post(attach_new_viewers))
}

#[derive(Debug, Deserialize)]
pub struct ListCampaignsQuery {
    pub status: Option<CampaignStatus>,
}

#[derive(Debug, Serialize)]
pub struct BuildTargetsResponse {
    pub created: u64,
}

async fn list_campaigns(
    State(state): State<AppState>,
    Query(query): Query<ListCampaignsQuery>,
) -> Result<Json<ApiResponse<Vec<Campaign>>>, AppError> {
    let campaigns = state_machine::list_campaigns(&state.pool, query.status).await?;
    Ok(Json(ApiResponse::new(campaigns)))
}

async fn create_campaign(
    State(state): State<AppState>,
    Json(spec): Json<CampaignSpec>,
) -> Result<(StatusCode, Json<ApiResponse<CreatedCampaign>>), AppError> {
    let created = state_machine::create_campaign(&state.pool, spec).await?;

    state.event_bus.publish(Event::CampaignCreated {
        campaign_id: created.campaign.id.clone(),
        name: created.campaign.name.clone(),
        created_targets: created.created_targets,
        timestamp: Utc::now(),
    });

    Ok((StatusCode::CREATED, Json(ApiResponse::new(created))))
}

async fn get_campaign(
    State(state): State<AppState>,
    Path(campaign_id): Path<String>,
) -> Result<Json<ApiResponse<Campaign>>, AppError> {
    let campaign = state_machine::get_campaign(&state.pool, &campaign_id).await?;
    Ok(Json(ApiResponse::new(campaign)))
}

async fn update_campaign(
    State(state): State<AppState>,
    Path(campaign_id): Path<String>,
    Json(req): Json<UpdateCampaignRequest>,
) -> Result<Json<ApiResponse<Campaign>>, AppError> {
    let update = state_machine::update_campaign(&state.pool, &campaign_id, req).await?;
    let now = Utc::now();

    if update.fields_changed {
        state.event_bus.publish(Event::CampaignUpdated {
            campaign_id: campaign_id.clone(),
            campaign: Box::new(update.campaign.clone()),
            timestamp: now,
        });
    }
    if let Some(change) = &update.status_change {
        if let Some(trigger) = change.trigger {
            state.event_bus.publish(Event::StatusChanged {
                campaign_id: campaign_id.clone(),
                from_status: change.from,
                to_status: change.campaign.status,
                trigger,
                timestamp: now,
            });
        }
    }

    Ok(Json(ApiResponse::new(update.campaign)))
}

async fn delete_campaign(
    State(state): State<AppState>,
    Path(campaign_id): Path<String>,
) -> Result<StatusCode, AppError> {
    state_machine::delete_campaign(&state.pool, &campaign_id).await?;

    state.event_bus.publish(Event::CampaignDeleted {
        campaign_id,
        timestamp: Utc::now(),
    });

    Ok(StatusCode::NO_CONTENT)
}

fn publish_refresh(state: &AppState, campaign_id: String, result: RefreshResult, new_viewers_only: bool) {
    state.event_bus.publish(Event::TargetsRefreshed {
        campaign_id,
        created_count: result.created_count,
        new_viewers_only,
        timestamp: Utc::now(),
    });
}

async fn refresh_targets(
    State(state): State<AppState>,
    Path(campaign_id): Path<String>,
) -> Result<Json<ApiResponse<RefreshResult>>, AppError> {
    let result = targeting::build_or_refresh_targets(&state.pool, &campaign_id).await?;
    publish_refresh(&state, campaign_id, result, false);
    Ok(Json(ApiResponse::new(result)))
}

async fn build_targets(
    State(state): State<AppState>,
    Path(campaign_id): Path<String>,
) -> Result<Json<ApiResponse<BuildTargetsResponse>>, AppError> {
    let result = targeting::build_or_refresh_targets(&state.pool, &campaign_id).await?;
    publish_refresh(&state, campaign_id, result, false);
    Ok(Json(ApiResponse::new(BuildTargetsResponse {
        created: result.created_count,
    })))
}

async fn attach_new_viewers(
    State(state): State<AppState>,
    Path(campaign_id): Path<String>,
) -> Result<Json<ApiResponse<RefreshResult>>, AppError> {
    let result = targeting::attach_new_viewers(&state.pool, &campaign_id).await?;
    publish_refresh(&state, campaign_id, result, true);
    Ok(Json(ApiResponse::new(result)))
}
