use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use relay_core::RelayError;

// ---------------------------------------------------------------------------
// AppError: unified error type for HTTP responses
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses. Always rendered as
/// `{"error": "<message>"}`; no internal detail beyond the message leaks.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    /// Construct a 400 Bad Request error with the given message.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(RelayError::InvalidRequest(msg.into()).into())
    }

    fn status(&self) -> StatusCode {
        let Some(e) = self.0.downcast_ref::<RelayError>() else {
            return StatusCode::INTERNAL_SERVER_ERROR;
        };
        match e {
            RelayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            RelayError::UpstreamRejected { .. }
            | RelayError::AuthExpired { .. }
            | RelayError::MalformedResponse { .. } => StatusCode::BAD_GATEWAY,
            RelayError::Unreachable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            RelayError::Unexpected(_)
            | RelayError::Config(_)
            | RelayError::Notification(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self.0, "request failed");
        }
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
