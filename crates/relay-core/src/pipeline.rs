//! Per-project incident pipeline.
//!
//! ```text
//! Start ─▶ resolve project ─┬─▶ not found ───────────────────────▶ not_found
//!                           └─▶ build payload ─▶ create ticket ─┬─▶ notify ─▶ incident_created
//!                                                               └─▶ error
//! ```
//!
//! Every downstream call is wrapped in the retry executor with its own
//! policy. A failure for one project key becomes an `error` outcome and
//! never disturbs the other keys of a batch.

use std::sync::Arc;

use serde::Serialize;

use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::notify::{EmailNotifier, Notifier};
use crate::retry::{self, RetryTiming};
use crate::servicenow::ServiceNowClient;
use crate::sonar::SonarClient;
use crate::token_cache::TokenCache;
use crate::types::{ProjectRef, Ticket, TicketPayload, TicketRouting, Trigger, WebhookEvent};

/// Retries for the SonarQube project lookup.
pub const RESOLVE_RETRIES: u32 = 2;
/// Retries for the up-front OAuth token acquisition.
pub const TOKEN_RETRIES: u32 = 3;
/// Retries for incident creation.
pub const TICKET_RETRIES: u32 = 3;
/// Largest accepted batch.
pub const MAX_BATCH_KEYS: usize = 50;

// ---------------------------------------------------------------------------
// OutcomeRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    IncidentCreated,
    NotFound,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketRef {
    pub number: String,
    pub sys_id: String,
    pub link: String,
}

/// Result of running the pipeline for one project key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeRecord {
    pub project_key: String,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket: Option<TicketRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OutcomeRecord {
    fn created(project_key: &str, ticket: TicketRef) -> Self {
        Self {
            project_key: project_key.to_string(),
            status: OutcomeStatus::IncidentCreated,
            ticket: Some(ticket),
            error: None,
        }
    }

    fn not_found(project_key: &str) -> Self {
        Self {
            project_key: project_key.to_string(),
            status: OutcomeStatus::NotFound,
            ticket: None,
            error: None,
        }
    }

    fn failed(project_key: &str, err: &RelayError) -> Self {
        Self {
            project_key: project_key.to_string(),
            status: OutcomeStatus::Error,
            ticket: None,
            error: Some(err.to_string()),
        }
    }
}

/// What a webhook delivery led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Gate status was `OK`; nothing was called.
    GatePassed,
    Processed(OutcomeRecord),
}

// ---------------------------------------------------------------------------
// IncidentPipeline
// ---------------------------------------------------------------------------

pub struct IncidentPipeline {
    sonar: SonarClient,
    servicenow: ServiceNowClient,
    notifier: Arc<dyn Notifier>,
    routing: TicketRouting,
    retry: RetryTiming,
}

impl IncidentPipeline {
    pub fn new(
        sonar: SonarClient,
        servicenow: ServiceNowClient,
        notifier: Arc<dyn Notifier>,
        routing: TicketRouting,
        retry: RetryTiming,
    ) -> Self {
        Self {
            sonar,
            servicenow,
            notifier,
            routing,
            retry,
        }
    }

    /// Wire every collaborator from configuration. `cache` is the process-wide
    /// token cache.
    pub fn from_config(config: &RelayConfig, cache: Arc<TokenCache>) -> Result<Self> {
        let sonar = SonarClient::new(&config.sonarqube)?;
        let servicenow = ServiceNowClient::new(&config.servicenow, cache)?;
        let notifier = EmailNotifier::new(config.email.clone(), servicenow.instance_url());
        Ok(Self::new(
            sonar,
            servicenow,
            Arc::new(notifier),
            config.servicenow.routing(),
            config.retry,
        ))
    }

    /// Replace the notifier.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn sonar(&self) -> &SonarClient {
        &self.sonar
    }

    pub fn servicenow(&self) -> &ServiceNowClient {
        &self.servicenow
    }

    /// Acquire a ServiceNow token with retries. Done once before a batch so
    /// an authorization problem fails the whole request fast.
    pub async fn acquire_token(&self) -> Result<String> {
        let policy = self.retry.policy("servicenow.token", TOKEN_RETRIES);
        retry::execute_if(&policy, || self.servicenow.get_token(), RelayError::is_retryable).await
    }

    /// Run the pipeline for a single key. Never fails: every problem is
    /// captured in the returned record.
    pub async fn process(&self, key: &str, trigger: &Trigger) -> OutcomeRecord {
        let resolve = self.retry.policy("sonarqube.resolve", RESOLVE_RETRIES);
        let project = match retry::execute_if(
            &resolve,
            || self.sonar.fetch_project(key),
            RelayError::is_retryable,
        )
        .await
        {
            Ok(Some(project)) => project,
            Ok(None) => return OutcomeRecord::not_found(key),
            Err(e) => {
                tracing::error!(project_key = key, error = %e, "project lookup failed");
                return OutcomeRecord::failed(key, &e);
            }
        };
        let project = fill_name_from_webhook(project, trigger);

        let payload = TicketPayload::build(&project, trigger, &self.routing);

        let create = self.retry.policy("servicenow.create_ticket", TICKET_RETRIES);
        let ticket = match retry::execute_if(
            &create,
            || self.servicenow.create_ticket(&payload),
            RelayError::is_retryable,
        )
        .await
        {
            Ok(ticket) => ticket,
            Err(e) => {
                tracing::error!(project_key = key, error = %e, "incident creation failed");
                return OutcomeRecord::failed(key, &e);
            }
        };
        tracing::info!(project_key = key, ticket = %ticket.number, "incident created");

        self.notifier.notify(&ticket, &project).await;

        OutcomeRecord::created(key, self.ticket_ref(ticket))
    }

    /// Process a batch of keys in input order.
    ///
    /// Keys are validated before anything is called. A token acquisition
    /// failure fails the whole batch; per-key failures are recorded in the
    /// corresponding outcome.
    pub async fn run_batch(&self, keys: &[String]) -> Result<Vec<OutcomeRecord>> {
        let keys = validate_keys(keys)?;
        self.acquire_token().await?;

        let mut outcomes = Vec::with_capacity(keys.len());
        for key in &keys {
            outcomes.push(self.process(key, &Trigger::Batch).await);
        }
        Ok(outcomes)
    }

    /// Handle a SonarQube project analysis webhook.
    pub async fn handle_webhook(&self, event: WebhookEvent) -> Result<WebhookOutcome> {
        if event.gate_passed() {
            tracing::info!(project_key = %event.project.key, "quality gate passed; no action");
            return Ok(WebhookOutcome::GatePassed);
        }
        if event.project.key.trim().is_empty() {
            return Err(RelayError::InvalidRequest("project.key is required".into()));
        }

        self.acquire_token().await?;
        let key = event.project.key.clone();
        let trigger = Trigger::QualityGate(Box::new(event));
        Ok(WebhookOutcome::Processed(self.process(&key, &trigger).await))
    }

    fn ticket_ref(&self, ticket: Ticket) -> TicketRef {
        let link = ticket.link(self.servicenow.instance_url());
        TicketRef {
            number: ticket.number,
            sys_id: ticket.sys_id,
            link,
        }
    }
}

fn fill_name_from_webhook(mut project: ProjectRef, trigger: &Trigger) -> ProjectRef {
    if project.name.is_none() {
        if let Trigger::QualityGate(event) = trigger {
            project.name = event.project.name.clone();
        }
    }
    project
}

/// Trim keys and enforce the 1..=50 size bound.
pub fn validate_keys(keys: &[String]) -> Result<Vec<String>> {
    if keys.is_empty() || keys.len() > MAX_BATCH_KEYS {
        return Err(RelayError::InvalidRequest(format!(
            "projectKeys must contain between 1 and {MAX_BATCH_KEYS} keys, got {}",
            keys.len()
        )));
    }
    let trimmed: Vec<String> = keys.iter().map(|k| k.trim().to_string()).collect();
    if let Some(pos) = trimmed.iter().position(|k| k.is_empty()) {
        return Err(RelayError::InvalidRequest(format!(
            "projectKeys[{pos}] is blank"
        )));
    }
    Ok(trimmed)
}
