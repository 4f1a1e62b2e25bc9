//! Message build, summary and dispatch routes

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;

use crate::domain::{BuildResult, Channel, DispatchResult, ResetResult};
use crate::events::Event;
use crate::messaging;
use crate::reports::{self, MessageSummary};

use super::{ApiResponse, AppError, AppState};

/// Create per-campaign message routes
pub fn message_routes() -> Router<AppState> {
    Router::new()
        .route("/:campaign_id/messages", get(message_summary).post(build_messages))
        .route("/:campaign_id/messages/reset-failed", post(reset_failed))
}

/// Create store-wide dispatch routes
pub fn dispatch_routes() -> Router<AppState> {
    Router::new()
        .route("/send-email", post(send_email))
        .route("/send-whatsapp", post(send_whatsapp))
}

#[derive(Debug, Deserialize)]
pub struct ResetFailedQuery {
    pub channel: Option<Channel>,
}

async fn build_messages(
    State(state): State<AppState>,
    Path(campaign_id): Path<String>,
) -> Result<Json<ApiResponse<BuildResult>>, AppError> {
    let result = messaging::build_messages(&state.pool, &campaign_id).await?;

    state.event_bus.publish(Event::MessagesBuilt {
        campaign_id,
        created_email: result.created_email,
        created_whatsapp: result.created_whatsapp,
        timestamp: Utc::now(),
    });

    Ok(Json(ApiResponse::new(result)))
}

async fn message_summary(
    State(state): State<AppState>,
    Path(campaign_id): Path<String>,
) -> Result<Json<ApiResponse<MessageSummary>>, AppError> {
    let summary = reports::message_summary(&state.pool, &campaign_id).await?;
    Ok(Json(ApiResponse::new(summary)))
}

async fn reset_failed(
    State(state): State<AppState>,
    Path(campaign_id): Path<String>,
    Query(query): Query<ResetFailedQuery>,
) -> Result<Json<ApiResponse<ResetResult>>, AppError> {
    let result = messaging::reset_failed_messages(&state.pool, &campaign_id, query.channel).await?;
    Ok(Json(ApiResponse::new(result)))
}

async fn dispatch(state: &AppState, channel: Channel) -> Result<Json<ApiResponse<DispatchResult>>, AppError> {
    let result = state.dispatcher.dispatch(channel).await?;

    state.event_bus.publish(Event::DispatchCompleted {
        channel,
        sent: result.sent,
        failed: result.failed,
        skipped: result.skipped,
        timestamp: Utc::now(),
    });

    Ok(Json(ApiResponse::new(result)))
}

async fn send_email(State(state): State<AppState>) -> Result<Json<ApiResponse<DispatchResult>>, AppError> {
    dispatch(&state, Channel::Email).await
}

async fn send_whatsapp(State(state): State<AppState>) -> Result<Json<ApiResponse<DispatchResult>>, AppError> {
    dispatch(&state, Channel::Whatsapp).await
}
