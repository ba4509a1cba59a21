use thiserror::Error;

/// A downstream system the relay talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upstream {
    SonarQube,
    ServiceNow,
    Smtp,
}

impl std::fmt::Display for Upstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Upstream::SonarQube => "sonarqube",
            Upstream::ServiceNow => "servicenow",
            Upstream::Smtp => "smtp",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("{service} rejected the request with status {status}: {body}")]
    UpstreamRejected {
        service: Upstream,
        status: u16,
        body: String,
    },

    #[error("{service} is unreachable: {reason}")]
    Unreachable { service: Upstream, reason: String },

    #[error("{service} rejected the bearer token (401)")]
    AuthExpired { service: Upstream },

    #[error("malformed response from {service}: {reason}")]
    MalformedResponse { service: Upstream, reason: String },

    #[error("unexpected error: {0}")]
    Unexpected(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("notification failed: {0}")]
    Notification(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl RelayError {
    /// Map a transport-level reqwest failure onto the taxonomy.
    ///
    /// A request that produced no response at all (connect failure, timeout)
    /// is `Unreachable`; a body that would not decode is `MalformedResponse`.
    pub fn from_transport(service: Upstream, err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            RelayError::Unreachable {
                service,
                reason: err.to_string(),
            }
        } else if err.is_decode() {
            RelayError::MalformedResponse {
                service,
                reason: err.to_string(),
            }
        } else {
            RelayError::Unexpected(format!("{service}: {err}"))
        }
    }

    /// Whether another attempt could plausibly succeed.
    ///
    /// Timeouts, 5xx, 408, 429 and expired tokens are transient. Other 4xx
    /// rejections and malformed payloads will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        match self {
            RelayError::Unreachable { .. }
            | RelayError::AuthExpired { .. }
            | RelayError::Unexpected(_) => true,
            RelayError::UpstreamRejected { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            RelayError::MalformedResponse { .. }
            | RelayError::Config(_)
            | RelayError::Notification(_)
            | RelayError::InvalidRequest(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_retryable() {
        let err = RelayError::UpstreamRejected {
            service: Upstream::ServiceNow,
            status: 503,
            body: "down".into(),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn client_errors_are_not_retryable() {
        let err = RelayError::UpstreamRejected {
            service: Upstream::SonarQube,
            status: 403,
            body: "forbidden".into(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn rate_limit_and_auth_expiry_are_retryable() {
        let limited = RelayError::UpstreamRejected {
            service: Upstream::ServiceNow,
            status: 429,
            body: String::new(),
        };
        assert!(limited.is_retryable());
        assert!(RelayError::AuthExpired {
            service: Upstream::ServiceNow
        }
        .is_retryable());
    }

    #[test]
    fn malformed_response_is_terminal() {
        let err = RelayError::MalformedResponse {
            service: Upstream::ServiceNow,
            reason: "missing result".into(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn display_names_the_service() {
        let err = RelayError::Unreachable {
            service: Upstream::SonarQube,
            reason: "connection refused".into(),
        };
        assert_eq!(
            err.to_string(),
            "sonarqube is unreachable: connection refused"
        );
    }
}
