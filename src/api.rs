// HTTP surface of the gateway

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::error::GatewayError;
use crate::gateway::TravelGateway;
use crate::model::{BuyTicketRequest, BuyTicketResponse};

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<TravelGateway>,
}

impl AppState {
    pub fn new(gateway: TravelGateway) -> Self {
        Self {
            gateway: Arc::new(gateway),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub message: &'static str,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/healthcheck", get(healthcheck))
        .route("/buyTicket", post(buy_ticket))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthcheck() -> Json<HealthResponse> {
    Json(HealthResponse { message: "OK" })
}

async fn buy_ticket(
    State(state): State<AppState>,
    payload: Result<Json<BuyTicketRequest>, JsonRejection>,
) -> Result<Json<BuyTicketResponse>, GatewayError> {
    let Json(request) = payload.map_err(|rejection| {
        GatewayError::InvalidInput(format!("malformed purchase request: {}", rejection.body_text()))
    })?;

    tracing::info!(?request, "buyTicket received");

    let receipt = state.gateway.buy_ticket(&request).await?;

    Ok(Json(BuyTicketResponse {
        transaction_id: receipt.transaction_id.to_string(),
    }))
}
