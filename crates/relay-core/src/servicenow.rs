//! ServiceNow OAuth exchange and incident creation.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;

use crate::config::ServiceNowConfig;
use crate::error::{RelayError, Result, Upstream};
use crate::sonar::check_status;
use crate::token_cache::{FetchedToken, TokenCache};
use crate::types::{Ticket, TicketPayload};

/// Upper bound for the OAuth token exchange.
pub const TOKEN_TIMEOUT: Duration = Duration::from_secs(15);

/// Upper bound for incident creation. Longer than the read path since this
/// is the side effect that matters.
pub const SUBMIT_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct IncidentResponse {
    #[serde(default)]
    result: Option<IncidentRecord>,
}

#[derive(Debug, Deserialize)]
struct IncidentRecord {
    number: String,
    sys_id: String,
}

#[derive(Debug, Clone)]
pub struct ServiceNowClient {
    http: reqwest::Client,
    instance_url: String,
    client_id: String,
    client_secret: String,
    cache: Arc<TokenCache>,
}

impl ServiceNowClient {
    pub fn new(config: &ServiceNowConfig, cache: Arc<TokenCache>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| RelayError::Config(format!("servicenow http client: {e}")))?;
        Ok(Self {
            http,
            instance_url: config.instance_url.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            cache,
        })
    }

    pub fn instance_url(&self) -> &str {
        &self.instance_url
    }

    /// Bearer token from the shared cache, exchanging client credentials on
    /// a miss.
    pub async fn get_token(&self) -> Result<String> {
        self.cache.get_token(|| self.exchange_credentials()).await
    }

    /// OAuth client-credentials grant against `/oauth_token.do`.
    pub async fn exchange_credentials(&self) -> Result<FetchedToken> {
        let url = format!("{}/oauth_token.do", self.instance_url);
        let resp = self
            .http
            .post(&url)
            .timeout(TOKEN_TIMEOUT)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| RelayError::from_transport(Upstream::ServiceNow, e))?;

        let resp = check_status(Upstream::ServiceNow, resp).await?;
        let body: TokenResponse = resp
            .json()
            .await
            .map_err(|e| RelayError::from_transport(Upstream::ServiceNow, e))?;

        let access_token = body
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| RelayError::MalformedResponse {
                service: Upstream::ServiceNow,
                reason: "token response has no access_token".into(),
            })?;
        if let Some(secs) = body.expires_in.filter(|s| *s <= 0) {
            return Err(RelayError::MalformedResponse {
                service: Upstream::ServiceNow,
                reason: format!("token response has non-positive expires_in {secs}"),
            });
        }
        tracing::info!(expires_in = ?body.expires_in, "obtained servicenow access token");
        Ok(FetchedToken {
            access_token,
            expires_in: body.expires_in,
        })
    }

    /// Acquire a token and file the incident.
    pub async fn create_ticket(&self, payload: &TicketPayload) -> Result<Ticket> {
        let token = self.get_token().await?;
        self.submit(&token, payload).await
    }

    /// POST the incident with the given bearer token.
    ///
    /// A 401 clears the token cache before the error is returned, so the
    /// next attempt performs a fresh exchange.
    pub async fn submit(&self, token: &str, payload: &TicketPayload) -> Result<Ticket> {
        let url = format!("{}/api/now/table/incident", self.instance_url);
        let resp = self
            .http
            .post(&url)
            .timeout(SUBMIT_TIMEOUT)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(payload)
            .send()
            .await
            .map_err(|e| RelayError::from_transport(Upstream::ServiceNow, e))?;

        if resp.status() == StatusCode::UNAUTHORIZED {
            self.cache.invalidate().await;
            return Err(RelayError::AuthExpired {
                service: Upstream::ServiceNow,
            });
        }

        let resp = check_status(Upstream::ServiceNow, resp).await?;
        let body: IncidentResponse = resp
            .json()
            .await
            .map_err(|e| RelayError::from_transport(Upstream::ServiceNow, e))?;

        let record = body.result.ok_or_else(|| RelayError::MalformedResponse {
            service: Upstream::ServiceNow,
            reason: "incident response has no result".into(),
        })?;
        Ok(Ticket {
            number: record.number,
            sys_id: record.sys_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TicketRouting;
    use crate::types::{ProjectRef, Trigger};
    use mockito::Matcher;

    fn client(server: &mockito::ServerGuard) -> ServiceNowClient {
        ServiceNowClient::new(
            &ServiceNowConfig {
                instance_url: server.url(),
                client_id: "cid".into(),
                client_secret: "csecret".into(),
                ..Default::default()
            },
            Arc::new(TokenCache::new()),
        )
        .unwrap()
    }

    fn payload() -> TicketPayload {
        TicketPayload::build(
            &ProjectRef {
                key: "svc".into(),
                name: None,
            },
            &Trigger::Batch,
            &TicketRouting::default(),
        )
    }

    async fn mock_token(
        server: &mut mockito::ServerGuard,
        token: &str,
        hits: usize,
    ) -> mockito::Mock {
        server
            .mock("POST", "/oauth_token.do")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "client_credentials".into()),
                Matcher::UrlEncoded("client_id".into(), "cid".into()),
                Matcher::UrlEncoded("client_secret".into(), "csecret".into()),
            ]))
            .with_status(200)
            .with_body(format!(
                r#"{{"access_token": "{token}", "expires_in": 1799, "token_type": "Bearer"}}"#
            ))
            .expect(hits)
            .create_async()
            .await
    }

    #[tokio::test]
    async fn create_ticket_exchanges_then_submits() {
        let mut server = mockito::Server::new_async().await;
        let oauth = mock_token(&mut server, "tok-1", 1).await;
        let incident = server
            .mock("POST", "/api/now/table/incident")
            .match_header("authorization", "Bearer tok-1")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "urgency": "3",
                "impact": "3",
            })))
            .with_status(201)
            .with_body(r#"{"result": {"number": "INC0010001", "sys_id": "abc123"}}"#)
            .expect(2)
            .create_async()
            .await;

        let sn = client(&server);
        let first = sn.create_ticket(&payload()).await.unwrap();
        let second = sn.create_ticket(&payload()).await.unwrap();
        assert_eq!(first.number, "INC0010001");
        assert_eq!(second.sys_id, "abc123");

        // Second ticket reused the cached token.
        oauth.assert_async().await;
        incident.assert_async().await;
    }

    #[tokio::test]
    async fn unauthorized_invalidates_cached_token() {
        let mut server = mockito::Server::new_async().await;
        let _oauth = mock_token(&mut server, "stale", 1).await;
        let _mock = server
            .mock("POST", "/api/now/table/incident")
            .with_status(401)
            .with_body(r#"{"error": {"message": "User Not Authenticated"}}"#)
            .create_async()
            .await;

        let cache = Arc::new(TokenCache::new());
        let sn = ServiceNowClient::new(
            &ServiceNowConfig {
                instance_url: server.url(),
                client_id: "cid".into(),
                client_secret: "csecret".into(),
                ..Default::default()
            },
            Arc::clone(&cache),
        )
        .unwrap();

        let err = sn.create_ticket(&payload()).await.unwrap_err();
        assert!(matches!(err, RelayError::AuthExpired { .. }));
        assert!(cache.expires_at().await.is_none());
    }

    #[tokio::test]
    async fn success_without_result_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        let _oauth = mock_token(&mut server, "tok", 1).await;
        let _mock = server
            .mock("POST", "/api/now/table/incident")
            .with_status(201)
            .with_body(r#"{}"#)
            .create_async()
            .await;

        let err = client(&server).create_ticket(&payload()).await.unwrap_err();
        assert!(matches!(err, RelayError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn token_response_without_access_token_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/oauth_token.do")
            .with_status(200)
            .with_body(r#"{"error": "invalid_client"}"#)
            .create_async()
            .await;

        let err = client(&server).get_token().await.unwrap_err();
        assert!(matches!(err, RelayError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn huge_expires_in_is_cached_without_panicking() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/oauth_token.do")
            .with_status(200)
            .with_body(r#"{"access_token": "tok", "expires_in": 9223372036854775807}"#)
            .create_async()
            .await;

        let cache = Arc::new(TokenCache::new());
        let sn = ServiceNowClient::new(
            &ServiceNowConfig {
                instance_url: server.url(),
                client_id: "cid".into(),
                client_secret: "csecret".into(),
                ..Default::default()
            },
            Arc::clone(&cache),
        )
        .unwrap();

        assert_eq!(sn.get_token().await.unwrap(), "tok");
        let expires_at = cache.expires_at().await.unwrap();
        assert!(
            expires_at
                <= chrono::Utc::now()
                    + chrono::Duration::seconds(crate::token_cache::MAX_EXPIRES_IN_SECS)
        );
    }

    #[tokio::test]
    async fn non_positive_expires_in_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/oauth_token.do")
            .with_status(200)
            .with_body(r#"{"access_token": "tok", "expires_in": 0}"#)
            .create_async()
            .await;

        let err = client(&server).get_token().await.unwrap_err();
        assert!(matches!(err, RelayError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn rejected_exchange_surfaces_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/oauth_token.do")
            .with_status(400)
            .with_body(r#"{"error_description": "access_denied"}"#)
            .create_async()
            .await;

        let err = client(&server).get_token().await.unwrap_err();
        assert!(matches!(
            err,
            RelayError::UpstreamRejected { status: 400, .. }
        ));
    }
}
