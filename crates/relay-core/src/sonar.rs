//! SonarQube project lookup.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;

use crate::config::SonarConfig;
use crate::error::{RelayError, Result, Upstream};
use crate::types::ProjectRef;

/// Upper bound for a single SonarQube request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Longest upstream body kept in an error message.
pub(crate) const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Deserialize)]
struct ComponentShow {
    component: Component,
}

#[derive(Debug, Deserialize)]
struct Component {
    key: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    qualifier: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SonarClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl SonarClient {
    pub fn new(config: &SonarConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RelayError::Config(format!("sonarqube http client: {e}")))?;
        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    /// Look up a project by its exact key.
    ///
    /// `Ok(None)` means SonarQube answered but has no project with this key
    /// (404, or a component that is not a project). It is a terminal
    /// outcome, not a failure.
    pub async fn fetch_project(&self, key: &str) -> Result<Option<ProjectRef>> {
        let url = format!("{}/api/components/show", self.base_url);
        let resp = self
            .http
            .get(&url)
            .basic_auth(&self.token, Some(""))
            .query(&[("component", key)])
            .send()
            .await
            .map_err(|e| RelayError::from_transport(Upstream::SonarQube, e))?;

        if resp.status() == StatusCode::NOT_FOUND {
            tracing::info!(project_key = key, "project not found in sonarqube");
            return Ok(None);
        }
        let resp = check_status(Upstream::SonarQube, resp).await?;
        let show: ComponentShow = resp
            .json()
            .await
            .map_err(|e| RelayError::from_transport(Upstream::SonarQube, e))?;

        let c = show.component;
        if c.key != key || c.qualifier.as_deref().is_some_and(|q| q != "TRK") {
            tracing::info!(
                project_key = key,
                qualifier = ?c.qualifier,
                "component is not a project"
            );
            return Ok(None);
        }
        Ok(Some(ProjectRef {
            key: c.key,
            name: c.name,
        }))
    }

    /// Reachability check used by the deep health probe.
    pub async fn ping(&self) -> Result<()> {
        let url = format!("{}/api/system/status", self.base_url);
        let resp = self
            .http
            .get(&url)
            .basic_auth(&self.token, Some(""))
            .send()
            .await
            .map_err(|e| RelayError::from_transport(Upstream::SonarQube, e))?;
        check_status(Upstream::SonarQube, resp).await?;
        Ok(())
    }
}

/// Turn a non-2xx response into `UpstreamRejected`, keeping a bounded
/// excerpt of the body.
pub(crate) async fn check_status(
    service: Upstream,
    resp: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let mut body = resp.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let cut = (0..=MAX_ERROR_BODY)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        body.truncate(cut);
    }
    Err(RelayError::UpstreamRejected {
        service,
        status: status.as_u16(),
        body,
    })
}
