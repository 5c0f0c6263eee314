use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;
use tracing::error;

use super::domain::UserId;
use super::repository::RewardStore;
use super::service::{EntrySubmission, RewardError, RewardOrchestrator};

/// Router builder exposing submission and streak query endpoints.
pub fn rewards_router<S>(service: Arc<RewardOrchestrator<S>>) -> Router
where
    S: RewardStore + 'static,
{
    Router::new()
        .route("/api/v1/rewards/entries", post(submit_handler::<S>))
        .route("/api/v1/rewards/summary", get(summary_handler::<S>))
        .route(
            "/api/v1/rewards/users/:user_id/stats",
            get(stats_handler::<S>),
        )
        .route(
            "/api/v1/rewards/users/:user_id/week",
            get(week_handler::<S>),
        )
        .with_state(service)
}

pub(crate) async fn submit_handler<S>(
    State(service): State<Arc<RewardOrchestrator<S>>>,
    Json(submission): Json<EntrySubmission>,
) -> Response
where
    S: RewardStore + 'static,
{
    match blocking(service, move |service| service.submit(submission, Utc::now())).await {
        Ok(result) => (StatusCode::CREATED, Json(result)).into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn stats_handler<S>(
    State(service): State<Arc<RewardOrchestrator<S>>>,
    Path(user_id): Path<String>,
) -> Response
where
    S: RewardStore + 'static,
{
    let user_id = UserId(user_id);
    match blocking(service, move |service| service.streak_stats(&user_id)).await {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn week_handler<S>(
    State(service): State<Arc<RewardOrchestrator<S>>>,
    Path(user_id): Path<String>,
) -> Response
where
    S: RewardStore + 'static,
{
    let now = Utc::now();
    let user_id = UserId(user_id);
    let lookup = user_id.clone();
    let outcome = blocking(service, move |service| {
        let has_entry = service.has_entry_in_week_of(&lookup, now)?;
        Ok((service.current_week(now), has_entry))
    })
    .await;
    match outcome {
        Ok((week, has_entry)) => {
            let payload = json!({
                "user_id": user_id,
                "week": week,
                "has_entry": has_entry,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(response) => response,
    }
}

pub(crate) async fn summary_handler<S>(
    State(service): State<Arc<RewardOrchestrator<S>>>,
) -> Response
where
    S: RewardStore + 'static,
{
    let outcome = blocking(service, |service| {
        service.engagement_summary(service.current_week(Utc::now()))
    })
    .await;
    match outcome {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(response) => response,
    }
}

/// Run `work` on the blocking pool; store calls may wait on locks.
async fn blocking<S, T, F>(service: Arc<RewardOrchestrator<S>>, work: F) -> Result<T, Response>
where
    S: RewardStore + 'static,
    T: Send + 'static,
    F: FnOnce(&RewardOrchestrator<S>) -> Result<T, RewardError> + Send + 'static,
{
    match tokio::task::spawn_blocking(move || work(&service)).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(error_response(error)),
        Err(join_error) => {
            error!(error = %join_error, "reward task did not complete");
            let payload = json!({ "error": "reward task did not complete" });
            Err((StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response())
        }
    }
}

pub(crate) fn error_status(error: &RewardError) -> StatusCode {
    match error {
        RewardError::InvalidTimestamp { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        RewardError::PersistenceConflict { .. } => StatusCode::CONFLICT,
        RewardError::PersistenceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn error_response(error: RewardError) -> Response {
    let payload = json!({
        "error": error.to_string(),
    });
    (error_status(&error), Json(payload)).into_response()
}
