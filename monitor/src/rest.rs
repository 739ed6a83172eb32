use axum::{
    extract::{rejection::QueryRejection, Path, Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::classify::{classify, should_notify};
use crate::errors::Error;
use crate::extract::{JsonBody, QueryParams};
use crate::metrics::{
    self, record_critical_event, ALERTS_LOGGED_TOTAL, HEARTBEATS_TOTAL, UNKNOWN_DEVICE_TOTAL,
};
use crate::model::{
    AlertFilter, AlertLoggedResponse, AlertQuery, AlertRecord, AlertRequest, HealthResponse,
    HeartbeatRequest, HeartbeatResponse, RegisterTabletRequest, RegisterTabletResponse, Tablet,
};
use crate::notify::{CriticalAlertPayload, WebhookNotifier};
use crate::store::TabletStore;
use crate::validate::{validate_alert, validate_heartbeat, validate_registration};

pub const SERVICE_NAME: &str = "tablet-monitor-api";
pub const DEFAULT_ALERT_LIMIT: i64 = 50;
pub const MAX_ALERT_LIMIT: i64 = 1000;

/// Dependencies shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TabletStore>,
    pub notifier: Arc<WebhookNotifier>,
}

impl AppState {
    pub fn new(store: Arc<dyn TabletStore>, notifier: WebhookNotifier) -> Self {
        Self {
            store,
            notifier: Arc::new(notifier),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", any(health))
        .route("/health", any(health))
        .route("/metrics", get(metrics_handler).fallback(not_found))
        .route("/api/heartbeat", post(heartbeat).fallback(not_found))
        .route("/api/alert", post(log_alert).fallback(not_found))
        .route(
            "/api/tablets",
            get(list_tablets).post(register_tablet).fallback(not_found),
        )
        // Wildcard so ids containing slashes still resolve.
        .route("/api/tablets/*device_id", get(get_tablet).fallback(not_found))
        .route("/api/alerts", get(list_alerts).fallback(not_found))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(cors))
        .with_state(state)
}

/// Opens the API to any origin and answers every preflight directly.
async fn cors(req: Request, next: Next) -> Response {
    let mut response = if req.method() == Method::OPTIONS {
        StatusCode::OK.into_response()
    } else {
        next.run(req).await
    };

    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );

    response
}

async fn heartbeat(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<HeartbeatRequest>,
) -> Result<Json<HeartbeatResponse>, ApiError> {
    let update = validate_heartbeat(request, Utc::now())?;

    let Some(applied) = state.store.apply_heartbeat(&update).await? else {
        UNKNOWN_DEVICE_TOTAL.inc();
        warn!("Heartbeat for unregistered device {}", update.device_id);
        return Err(ApiError::NotFound("Device not found".to_string()));
    };
    HEARTBEATS_TOTAL.inc();

    let critical_event = classify(&applied.prior, &update);
    debug!(
        "Heartbeat from {}: battery={} charging={} event={:?}",
        update.device_id, update.battery_level, update.is_charging, critical_event
    );

    let mut webhook_triggered = false;
    if let Some(event) = critical_event {
        record_critical_event(event);
        info!("Critical event {} on {}", event, update.device_id);

        if should_notify(&applied.prior, critical_event) {
            let payload = CriticalAlertPayload {
                device_id: update.device_id.clone(),
                device_name: applied.prior.device_name.clone(),
                alert_type: event,
                battery_level: update.battery_level,
                is_charging: update.is_charging,
                timestamp: update.seen_at,
            };
            webhook_triggered = state.notifier.notify(&payload).await;
        }
    }

    Ok(Json(HeartbeatResponse {
        success: true,
        changes: applied.changes,
        device_id: update.device_id,
        critical_event,
        webhook_triggered,
    }))
}

async fn log_alert(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<AlertRequest>,
) -> Result<Json<AlertLoggedResponse>, ApiError> {
    let alert = validate_alert(request)?;
    state.store.log_alert(&alert).await?;
    ALERTS_LOGGED_TOTAL.inc();
    debug!("Logged {} alert for {}", alert.alert_type, alert.device_id);

    Ok(Json(AlertLoggedResponse { success: true }))
}

async fn list_tablets(State(state): State<AppState>) -> Result<Json<Vec<Tablet>>, ApiError> {
    Ok(Json(state.store.list_tablets().await?))
}

async fn get_tablet(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<Json<Tablet>, ApiError> {
    state
        .store
        .get_tablet(&device_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Tablet not found".to_string()))
}

async fn list_alerts(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<AlertQuery>,
) -> Result<Json<Vec<AlertRecord>>, ApiError> {
    // Negative limits clamp to an empty page.
    let filter = AlertFilter {
        limit: query
            .limit
            .unwrap_or(DEFAULT_ALERT_LIMIT)
            .clamp(0, MAX_ALERT_LIMIT),
        device_id: query.device_id.filter(|id| !id.is_empty()),
    };

    Ok(Json(state.store.list_alerts(&filter).await?))
}

async fn register_tablet(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<RegisterTabletRequest>,
) -> Result<Json<RegisterTabletResponse>, ApiError> {
    let (device_id, device_name) = validate_registration(request)?;
    state
        .store
        .register_tablet(&device_id, &device_name)
        .await?;
    info!("Registered tablet {} ({})", device_id, device_name);

    Ok(Json(RegisterTabletResponse {
        success: true,
        device_id,
    }))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: SERVICE_NAME,
        timestamp: Utc::now(),
    })
}

async fn metrics_handler() -> String {
    metrics::gather_metrics()
}

async fn not_found() -> ApiError {
    ApiError::NotFound("Not found".to_string())
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    success: bool,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(msg) = &self {
            error!("API error: {}", msg);
        }

        let body = ErrorBody {
            error: self.to_string(),
            success: false,
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Validation(msg) => ApiError::Validation(msg),
            Error::DuplicateDevice(_) => ApiError::Conflict(err.to_string()),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}
