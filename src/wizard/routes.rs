//! JSON endpoints for step validation, record creation and sessions.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::csrf::{CsrfGuard, SESSION_HEADER, TOKEN_HEADER};
use crate::error::DatabaseError;

use super::model::{ValidationResult, WizardData};
use super::steps::StepValidator;
use super::submission::{SubmissionOutcome, SubmissionService};

/// Shared state for onboarding routes.
#[derive(Clone)]
pub struct OnboardingState {
    pub validator: Arc<StepValidator>,
    pub submission: Arc<SubmissionService>,
    pub csrf: Arc<CsrfGuard>,
}

/// Missing or `null` members fall back to step 0 and empty data.
#[derive(Debug, Deserialize)]
struct ValidateStepRequest {
    #[serde(default)]
    step: Option<i64>,
    #[serde(default)]
    wizard: Option<WizardData>,
}

#[derive(Debug, Deserialize)]
struct CreateRequest {
    #[serde(default)]
    wizard: Option<WizardData>,
}

/// Body that is not JSON of the expected shape. Answered with 400 so it is
/// never mistaken for a field-level 422.
fn bad_body(rejection: JsonRejection) -> Response {
    warn!(status = %rejection.status(), reason = %rejection.body_text(), "Malformed request body");
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": rejection.body_text() })),
    )
        .into_response()
}

fn unprocessable(errors: ValidationResult) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({ "errors": errors })),
    )
        .into_response()
}

fn storage_failure(e: DatabaseError) -> Response {
    error!(error = %e, "Storage failure while handling onboarding request");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Internal server error" })),
    )
        .into_response()
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "onboarding-wizard"
    }))
}

/// GET /onboarding/session
///
/// Starts a wizard session and returns its anti-forgery token.
async fn issue_session(State(state): State<OnboardingState>) -> impl IntoResponse {
    Json(state.csrf.issue().await)
}

/// POST /onboarding/validate-step
async fn validate_step(
    State(state): State<OnboardingState>,
    body: Result<Json<ValidateStepRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_body(rejection),
    };
    let wizard = req.wizard.unwrap_or_default();
    match state.validator.validate(req.step.unwrap_or(0), &wizard).await {
        Ok(result) if result.is_empty() => Json(json!({ "status": "ok" })).into_response(),
        Ok(result) => unprocessable(result),
        Err(e) => storage_failure(e),
    }
}

/// POST /onboarding/create
///
/// Requires the session id and token headers issued by `/onboarding/session`.
/// The session is revoked once a record is created from it.
async fn create(
    State(state): State<OnboardingState>,
    headers: HeaderMap,
    body: Result<Json<CreateRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_body(rejection),
    };
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let session_id = match state
        .csrf
        .verify(header(SESSION_HEADER), header(TOKEN_HEADER))
        .await
    {
        Ok(id) => id,
        Err(rejection) => {
            warn!(reason = %rejection, "Create refused: anti-forgery check failed");
            return (
                StatusCode::FORBIDDEN,
                Json(json!({ "error": "Invalid anti-forgery token." })),
            )
                .into_response();
        }
    };

    let wizard = req.wizard.unwrap_or_default();
    match state.submission.submit(&wizard).await {
        Ok(SubmissionOutcome::Created(record)) => {
            state.csrf.revoke(session_id).await;
            info!(user_id = record.user.id, session_id = %session_id, "Onboarding completed");
            (
                StatusCode::CREATED,
                Json(json!({ "status": "ok", "userId": record.user.id })),
            )
                .into_response()
        }
        Ok(SubmissionOutcome::Rejected(errors)) => unprocessable(errors),
        Err(e) => storage_failure(e),
    }
}

/// Build the onboarding router.
pub fn onboarding_routes(state: OnboardingState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/onboarding/session", get(issue_session))
        .route("/onboarding/validate-step", post(validate_step))
        .route("/onboarding/create", post(create))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
