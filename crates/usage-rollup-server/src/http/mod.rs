mod error;
mod handlers;

pub use error::{ApiError, ErrorBody};
pub use handlers::{HealthResponse, TriggerQuery, TriggerResponse, UploadAck};

use axum::routing::{get, post, put};
use axum::Router;
use std::sync::Arc;

use crate::identity::IdentityVerifier;
use crate::triggers::TriggerLayer;

pub const ADMIN_SECRET_HEADER: &str = "x-admin-secret";

#[derive(Clone)]
pub struct AppState {
    pub triggers: Arc<TriggerLayer>,
    pub verifier: Arc<dyn IdentityVerifier>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/v1/weekly-summaries", post(handlers::push_weekly_summary))
        .route("/v1/daily-usage", put(handlers::upload_daily_usage))
        .route("/v1/admin/aggregate-weekly", post(handlers::aggregate_weekly))
        .with_state(state)
}
