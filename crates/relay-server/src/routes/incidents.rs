use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;

use crate::error::AppError;
use crate::state::AppState;

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIncidentsBody {
    pub project_keys: Vec<String>,
}

/// POST /create-incidents
///
/// Files one incident per project key.
///
/// Per-key failures are reported inside `results`; only validation and the
/// up-front token acquisition fail the request as a whole.
pub async fn create_incidents(
    State(app): State<AppState>,
    body: Result<Json<CreateIncidentsBody>, JsonRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    let Json(body) = body.map_err(|e| AppError::bad_request(e.body_text()))?;

    let results = app.pipeline.run_batch(&body.project_keys).await?;

    Ok(Json(serde_json::json!({
        "message": format!("Processed {} project key(s)", results.len()),
        "results": results,
    })))
}
