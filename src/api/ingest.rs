//! Signal-store ingestion routes

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};

use crate::domain::{Customer, NewSignal, Order, VisitorLink};
use crate::ingest::{self, OrderRecorded, Recorded};

use super::{ApiResponse, AppError, AppState};

pub fn ingest_routes() -> Router<AppState> {
    Router::new()
        .route("/signals", post(record_signal))
        .route("/customers", post(upsert_customer))
        .route("/visitor-links", post(link_visitor))
        .route("/orders", post(record_order))
}

async fn record_signal(
    State(state): State<AppState>,
    Json(signal): Json<NewSignal>,
) -> Result<(StatusCode, Json<ApiResponse<Recorded>>), AppError> {
    let recorded = ingest::record_signal(&state.pool, signal).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::new(recorded))))
}

async fn upsert_customer(
    State(state): State<AppState>,
    Json(customer): Json<Customer>,
) -> Result<Json<ApiResponse<Customer>>, AppError> {
    let customer = ingest::upsert_customer(&state.pool, customer).await?;
    Ok(Json(ApiResponse::new(customer)))
}

async fn link_visitor(
    State(state): State<AppState>,
    Json(link): Json<VisitorLink>,
) -> Result<Json<ApiResponse<VisitorLink>>, AppError> {
    let link = ingest::link_visitor(&state.pool, link).await?;
    Ok(Json(ApiResponse::new(link)))
}

async fn record_order(
    State(state): State<AppState>,
    Json(order): Json<Order>,
) -> Result<(StatusCode, Json<ApiResponse<OrderRecorded>>), AppError> {
    let recorded = ingest::record_order(&state.pool, order).await?;
    let status = if recorded.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(ApiResponse::new(recorded))))
}
