//! JSON/HTTP adapter over the risk service

use super::{Ack, RiskService};
use crate::account::OrderRequest;
use crate::emergency::{EmergencyError, EmergencyStopRecord};
use crate::health::HealthReport;
use crate::risk::RiskMetrics;
use crate::validator::OrderDecision;
use axum::{
    extract::{Path, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use subtle::ConstantTimeEq;

const HEALTH_PATH: &str = "/health";

/// API key gate in front of every route except `/health`
#[derive(Debug, Clone, Default)]
pub struct AuthSettings {
    pub enabled: bool,
    /// With auth enabled and no key, every guarded request is refused
    pub api_key: Option<String>,
}

/// Build the router for every endpoint
pub fn router(service: Arc<RiskService>, auth: AuthSettings) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(health))
        .route("/v1/orders/check", post(check_order))
        .route("/v1/orders/check-batch", post(check_batch))
        .route("/v1/accounts/{id}/metrics", get(account_metrics))
        .route("/v1/emergency-stop", post(trigger_stop).get(stop_status))
        .route("/v1/emergency-stop/progress", post(unwind_progress))
        .route("/v1/emergency-stop/complete", post(complete_unwind))
        .route("/v1/emergency-stop/re-enable", post(re_enable))
        .layer(middleware::from_fn_with_state(Arc::new(auth), require_api_key))
        .layer(middleware::from_fn(log_request))
        .with_state(service)
}

async fn require_api_key(
    State(auth): State<Arc<AuthSettings>>,
    request: Request,
    next: Next,
) -> Response {
    if !auth.enabled || request.uri().path() == HEALTH_PATH {
        return next.run(request).await;
    }
    let Some(expected) = auth.api_key.as_deref().filter(|key| !key.is_empty()) else {
        return ApiError::unauthorized("authentication not configured").into_response();
    };

    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    let rejection = match presented {
        None => Some("missing bearer token"),
        Some(token) if bool::from(token.as_bytes().ct_eq(expected.as_bytes())) => None,
        Some(_) => {
            tracing::warn!(path = %request.uri().path(), "Rejected request with invalid API key");
            Some("invalid API key")
        }
    };
    match rejection {
        Some(message) => ApiError::unauthorized(message).into_response(),
        None => next.run(request).await,
    }
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16();
    let latency_us = started.elapsed().as_micros() as u64;
    if response.status().is_server_error() {
        tracing::error!(method = %method, path = %path, status, latency_us, "Request failed");
    } else {
        tracing::debug!(method = %method, path = %path, status, latency_us, "Request served");
    }
    response
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TriggerRequest {
    pub reason: String,
    pub triggered_by: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReEnableRequest {
    pub authorized_by: String,
    pub reason: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProgressRequest {
    pub orders_canceled: u32,
    pub positions_closed: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StopStatusResponse {
    pub stopped: bool,
    pub record: Option<EmergencyStopRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Error mapped to a status code and a JSON body
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn unauthorized(message: &str) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: message.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

impl From<EmergencyError> for ApiError {
    fn from(e: EmergencyError) -> Self {
        let status = match e {
            EmergencyError::NotStopped => StatusCode::CONFLICT,
            EmergencyError::MissingAuthorization => StatusCode::BAD_REQUEST,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

async fn health(State(service): State<Arc<RiskService>>) -> Json<HealthReport> {
    Json(service.health())
}

async fn check_order(
    State(service): State<Arc<RiskService>>,
    Json(order): Json<OrderRequest>,
) -> Json<OrderDecision> {
    Json(service.check_order(&order).await)
}

async fn check_batch(
    State(service): State<Arc<RiskService>>,
    Json(orders): Json<Vec<OrderRequest>>,
) -> Json<Vec<OrderDecision>> {
    Json(service.check_orders(&orders).await)
}

async fn account_metrics(
    State(service): State<Arc<RiskService>>,
    Path(account_id): Path<String>,
) -> Result<Json<RiskMetrics>, ApiError> {
    service
        .get_risk_metrics(&account_id)
        .await
        .map(Json)
        .map_err(|e| ApiError {
            status: StatusCode::NOT_FOUND,
            message: e.to_string(),
        })
}

async fn trigger_stop(
    State(service): State<Arc<RiskService>>,
    Json(req): Json<TriggerRequest>,
) -> Result<Json<Ack>, ApiError> {
    if req.reason.trim().is_empty() || req.triggered_by.trim().is_empty() {
        return Err(ApiError {
            status: StatusCode::BAD_REQUEST,
            message: "reason and triggered_by are required".to_string(),
        });
    }
    tracing::warn!(reason = %req.reason, triggered_by = %req.triggered_by, "Emergency stop requested");
    Ok(Json(service.trigger_emergency_stop(&req.reason, &req.triggered_by)))
}

async fn stop_status(State(service): State<Arc<RiskService>>) -> Json<StopStatusResponse> {
    let record = service.emergency_stop_status();
    Json(StopStatusResponse {
        stopped: record.is_some(),
        record,
    })
}

async fn unwind_progress(
    State(service): State<Arc<RiskService>>,
    Json(req): Json<ProgressRequest>,
) -> Result<Json<Ack>, ApiError> {
    Ok(Json(service.report_unwind_progress(
        req.orders_canceled,
        req.positions_closed,
    )?))
}

async fn complete_unwind(State(service): State<Arc<RiskService>>) -> Result<Json<Ack>, ApiError> {
    Ok(Json(service.complete_unwind()?))
}

async fn re_enable(
    State(service): State<Arc<RiskService>>,
    Json(req): Json<ReEnableRequest>,
) -> Result<Json<Ack>, ApiError> {
    Ok(Json(service.re_enable_trading(&req.authorized_by, &req.reason)?))
}
