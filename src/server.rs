//! Axum routes. Every failure is answered with `{result: false, error}`.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::errors::{ScribeError, ScribeResult};
use crate::steps::journey::JourneyAggregator;
use crate::steps::payload::StepPayload;
use crate::steps::service::DescriptionService;

pub struct AppState {
    pub steps: DescriptionService,
    pub journeys: JourneyAggregator,
    /// Active provider id, reported by `/health`.
    pub provider: String,
}

pub type SharedState = Arc<AppState>;

#[derive(Debug, Default, Serialize, PartialEq)]
pub struct StepResponse {
    pub result: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Default, Serialize, PartialEq)]
pub struct StepLookupResponse {
    pub result: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Default, Serialize, PartialEq)]
pub struct JourneyResponse {
    pub result: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JourneyRequest {
    #[serde(default)]
    steps: Vec<String>,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/step-description", post(post_step_description))
        .route("/step-description/:element_id", get(get_step_description))
        .route("/journey-summary", post(post_journey_summary))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(state: SharedState, addr: &str) -> ScribeResult<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

fn parse_body(body: &Bytes) -> ScribeResult<serde_json::Value> {
    serde_json::from_slice(body).map_err(|e| ScribeError::InputValidation(format!("body is not JSON: {e}")))
}

fn log_failure(route: &str, e: &ScribeError) {
    if e.is_client_error() {
        tracing::warn!(route, error = %e, "request rejected");
    } else {
        tracing::error!(route, error = %e, "request failed");
    }
}

/// POST /step-description
pub async fn post_step_description(State(app): State<SharedState>, body: Bytes) -> Json<StepResponse> {
    let outcome = match parse_body(&body).and_then(StepPayload::from_json) {
        Ok(payload) => app.steps.describe(&payload).await,
        Err(e) => Err(e),
    };
    match outcome {
        Ok(out) => Json(StepResponse {
            result: true,
            description: Some(out.description),
            name: Some(out.name),
            element_id: Some(out.element_id),
            cached: Some(out.cached),
            error: None,
        }),
        Err(e) => {
            log_failure("step-description", &e);
            Json(StepResponse {
                error: Some(e.to_string()),
                ..Default::default()
            })
        }
    }
}

/// GET /step-description/:element_id
pub async fn get_step_description(
    State(app): State<SharedState>,
    Path(element_id): Path<String>,
) -> Json<StepLookupResponse> {
    match app.steps.cached(&element_id).await {
        Ok(Some(record)) => Json(StepLookupResponse {
            result: true,
            element_id: Some(record.element_id),
            name: Some(record.name),
            description: Some(record.description),
            error: None,
        }),
        Ok(None) => Json(StepLookupResponse {
            error: Some("Step not found".into()),
            ..Default::default()
        }),
        Err(e) => {
            log_failure("step-description/get", &e);
            Json(StepLookupResponse {
                error: Some(e.to_string()),
                ..Default::default()
            })
        }
    }
}

/// POST /journey-summary
pub async fn post_journey_summary(State(app): State<SharedState>, body: Bytes) -> Json<JourneyResponse> {
    let request = parse_body(&body).and_then(|v| {
        serde_json::from_value::<JourneyRequest>(v)
            .map_err(|e| ScribeError::InputValidation(format!("malformed payload: {e}")))
    });
    let outcome = match request {
        Ok(req) if req.steps.is_empty() => Err(ScribeError::InputValidation("No steps provided".into())),
        Ok(req) => app.journeys.summarize(&req.steps).await,
        Err(e) => Err(e),
    };
    match outcome {
        Ok(summary) => Json(JourneyResponse {
            result: true,
            name: Some(summary.name),
            description: Some(summary.description),
            error: None,
        }),
        Err(e) => {
            log_failure("journey-summary", &e);
            Json(JourneyResponse {
                error: Some(e.to_string()),
                ..Default::default()
            })
        }
    }
}

/// GET /health
async fn health(State(app): State<SharedState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "stepscribe",
        "provider": app.provider,
    }))
}
