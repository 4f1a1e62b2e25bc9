//! API route definitions

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::integrations::TransportStatus;

use super::{
    campaign_routes, dispatch_routes, ingest_routes, message_routes, report_routes,
    storefront_routes, target_routes, ws_handler, ApiResponse, AppState,
};

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub transports: TransportStatus,
}

/// Build the full router
pub fn build_router(state: AppState) -> Router {
    let cors_enabled = state.config.server.cors_enabled;

    let campaigns = Router::new()
        .merge(campaign_routes())
        .merge(target_routes())
        .merge(message_routes())
        .merge(report_routes());

    let api_routes = Router::new()
        .nest("/campaigns", campaigns)
        .nest("/messages", dispatch_routes())
        .merge(storefront_routes())
        .merge(ingest_routes())
        .route("/ws", get(ws_handler));

    let mut app = Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http());

    if cors_enabled {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    app.with_state(state)
}

async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<HealthStatus>> {
    Json(ApiResponse::new(HealthStatus {
        status: "ok",
        transports: state.dispatcher.transports().status(),
    }))
}
