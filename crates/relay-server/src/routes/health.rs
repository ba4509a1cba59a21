use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;

use crate::state::AppState;

#[derive(serde::Deserialize, Default)]
pub struct HealthParams {
    #[serde(default)]
    pub deep: bool,
}

/// GET /healthz[?deep=true]
///
/// Shallow: liveness only. Deep: SonarQube reachability plus a fresh
/// ServiceNow credential exchange that bypasses the token cache; 503 if
/// either fails.
pub async fn healthz(
    State(app): State<AppState>,
    Query(params): Query<HealthParams>,
) -> (StatusCode, Json<serde_json::Value>) {
    if !params.deep {
        return (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })));
    }

    let (sonar, snow) = tokio::join!(
        app.pipeline.sonar().ping(),
        app.pipeline.servicenow().exchange_credentials()
    );
    let healthy = sonar.is_ok() && snow.is_ok();

    let body = serde_json::json!({
        "status": if healthy { "ok" } else { "degraded" },
        "checks": {
            "sonarqube": check(sonar.map(|_| ())),
            "servicenow": check(snow.map(|_| ())),
        },
    });
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

fn check(result: relay_core::Result<()>) -> serde_json::Value {
    match result {
        Ok(()) => serde_json::json!({ "ok": true }),
        Err(e) => {
            tracing::warn!(error = %e, "health check failed");
            serde_json::json!({ "ok": false, "error": e.to_string() })
        }
    }
}
