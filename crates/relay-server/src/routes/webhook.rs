use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use relay_core::types::WebhookEvent;
use relay_core::{OutcomeStatus, WebhookOutcome};

use crate::error::AppError;
use crate::state::AppState;

/// POST /sonarqube-webhook
///
/// Files an incident when a quality gate fails.
pub async fn sonarqube_webhook(
    State(app): State<AppState>,
    body: Result<Json<WebhookEvent>, JsonRejection>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let Json(event) = body.map_err(|e| AppError::bad_request(e.body_text()))?;
    let project_key = event.project.key.clone();

    let outcome = app.pipeline.handle_webhook(event).await?;
    let response = match outcome {
        WebhookOutcome::GatePassed => (
            StatusCode::OK,
            Json(serde_json::json!({
                "message": "Quality gate passed; no action taken",
                "projectKey": project_key,
            })),
        ),
        WebhookOutcome::Processed(record) => {
            let (status, message) = match record.status {
                OutcomeStatus::IncidentCreated => (StatusCode::OK, "Incident created"),
                OutcomeStatus::NotFound => (StatusCode::OK, "Project not found; no incident created"),
                OutcomeStatus::Error => (StatusCode::BAD_GATEWAY, "Failed to create incident"),
            };
            (
                status,
                Json(serde_json::json!({
                    "message": message,
                    "result": record,
                })),
            )
        }
    };
    Ok(response)
}
