//! `relay-core`: turns SonarQube quality findings into ServiceNow incidents.
//!
//! ```text
//! webhook / batch ─▶ IncidentPipeline ─┬─▶ SonarClient        (project lookup)
//!                                      ├─▶ ServiceNowClient   (OAuth via TokenCache, incident)
//!                                      └─▶ Notifier           (best-effort e-mail)
//! ```
//!
//! All downstream calls go through [`retry::execute_if`] with a per-call-site
//! [`retry::RetryPolicy`].

pub mod config;
pub mod error;
pub mod notify;
pub mod pipeline;
pub mod retry;
pub mod servicenow;
pub mod sonar;
pub mod token_cache;
pub mod types;

pub use error::{RelayError, Result, Upstream};
pub use pipeline::{IncidentPipeline, OutcomeRecord, OutcomeStatus, WebhookOutcome};
pub use token_cache::TokenCache;
