use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::Json;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use usage_rollup_common::{AuthError, UserId};
use uuid::Uuid;

use super::error::ApiError;
use super::{AppState, ADMIN_SECRET_HEADER};
use crate::triggers::{DailyUsageUpload, DevicePush, PushAck};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TriggerQuery {
    /// RFC3339 reference instant; the week before it is aggregated.
    pub at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerResponse {
    pub success: bool,
    pub run_id: Uuid,
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub written: usize,
    pub skipped: usize,
    pub stale: usize,
    pub failed: usize,
    pub unattempted: usize,
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadAck {
    pub success: bool,
    pub recorded: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub store: String,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then_some(token.trim())
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<UserId, ApiError> {
    let token = bearer_token(headers).ok_or(AuthError::MissingCredential)?;
    let user = state.verifier.verify(token).await?;
    debug!(user_id = %user, "Authenticated device request");
    Ok(user)
}

fn parse_reference(at: Option<&str>) -> Result<Option<DateTime<Utc>>, ApiError> {
    at.map(|value| {
        DateTime::parse_from_rfc3339(value)
            .map(|parsed| parsed.with_timezone(&Utc))
            .map_err(|_| ApiError::BadRequest(format!("at must be an RFC3339 timestamp, got {:?}", value)))
    })
    .transpose()
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    if state.triggers.store_healthy().await {
        (StatusCode::OK, Json(HealthResponse { status: "ok".into(), store: "ok".into() }))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse { status: "degraded".into(), store: "unavailable".into() }),
        )
    }
}

/// Credentials are checked before the body is looked at.
pub async fn push_weekly_summary(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<DevicePush>, JsonRejection>,
) -> Result<Json<PushAck>, ApiError> {
    let user = authenticate(&state, &headers).await?;
    let Json(push) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let ack = state.triggers.device_push(&user, push).await?;
    Ok(Json(ack))
}

pub async fn upload_daily_usage(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<Vec<DailyUsageUpload>>, JsonRejection>,
) -> Result<Json<UploadAck>, ApiError> {
    let user = authenticate(&state, &headers).await?;
    let Json(rows) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let recorded = state.triggers.upload_daily_usage(&user, rows).await?;
    Ok(Json(UploadAck { success: true, recorded }))
}

pub async fn aggregate_weekly(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TriggerQuery>,
) -> Result<Json<TriggerResponse>, ApiError> {
    let secret = headers.get(ADMIN_SECRET_HEADER).and_then(|v| v.to_str().ok());

    // Secret first: a malformed `at` from an unauthorized caller is still a 403
    state.triggers.authorize_operator(secret)?;
    let reference = parse_reference(query.at.as_deref())?;

    let report = state.triggers.manual_run(secret, reference).await?;

    Ok(Json(TriggerResponse {
        success: true,
        run_id: report.run_id,
        week_start: report.window.start(),
        week_end: report.window.end(),
        written: report.written,
        skipped: report.skipped,
        stale: report.stale,
        failed: report.failures.len(),
        unattempted: report.unattempted(),
        truncated: report.truncated,
    }))
}
