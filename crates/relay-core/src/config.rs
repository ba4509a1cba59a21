use crate::error::{RelayError, Result};
use crate::retry::RetryTiming;
use crate::types::TicketRouting;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

impl ConfigWarning {
    fn error(message: impl Into<String>) -> Self {
        Self {
            level: WarnLevel::Error,
            message: message.into(),
        }
    }

    fn warning(message: impl Into<String>) -> Self {
        Self {
            level: WarnLevel::Warning,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SonarConfig {
    pub url: String,
    /// User token, sent as the Basic auth username.
    pub token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceNowConfig {
    pub instance_url: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignment_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl ServiceNowConfig {
    pub fn routing(&self) -> TicketRouting {
        TicketRouting {
            assignment_group: self.assignment_group.clone(),
            caller_id: self.caller_id.clone(),
            category: self.category.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub from: String,
    pub to: String,
    #[serde(default = "default_starttls")]
    pub starttls: bool,
}

fn default_smtp_port() -> u16 {
    587
}

fn default_starttls() -> bool {
    true
}

// ---------------------------------------------------------------------------
// RelayConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    pub sonarqube: SonarConfig,
    pub servicenow: ServiceNowConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<EmailConfig>,
    #[serde(default)]
    pub retry: RetryTiming,
}

impl RelayConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| RelayError::Config(format!("{}: {e}", path.display())))?;
        serde_yaml::from_str(&data)
            .map_err(|e| RelayError::Config(format!("{}: {e}", path.display())))
    }

    /// Copy with every secret replaced, for display.
    pub fn redacted(&self) -> Self {
        let mut out = self.clone();
        out.sonarqube.token = mask(&out.sonarqube.token);
        out.servicenow.client_secret = mask(&out.servicenow.client_secret);
        if let Some(email) = out.email.as_mut() {
            email.password = email.password.as_deref().map(mask);
        }
        out
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        let required = [
            ("sonarqube.url", &self.sonarqube.url),
            ("sonarqube.token", &self.sonarqube.token),
            ("servicenow.instance_url", &self.servicenow.instance_url),
            ("servicenow.client_id", &self.servicenow.client_id),
            ("servicenow.client_secret", &self.servicenow.client_secret),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                warnings.push(ConfigWarning::error(format!("{field} is required")));
            }
        }

        for (field, value) in [
            ("sonarqube.url", &self.sonarqube.url),
            ("servicenow.instance_url", &self.servicenow.instance_url),
        ] {
            if !value.trim().is_empty()
                && !value.starts_with("http://")
                && !value.starts_with("https://")
            {
                warnings.push(ConfigWarning::error(format!(
                    "{field} must be an http(s) URL, got '{value}'"
                )));
            }
        }

        match &self.email {
            None => warnings.push(ConfigWarning::warning(
                "email is not configured; incident notifications are disabled",
            )),
            Some(email) => {
                for (field, value) in [
                    ("email.host", &email.host),
                    ("email.from", &email.from),
                    ("email.to", &email.to),
                ] {
                    if value.trim().is_empty() {
                        warnings.push(ConfigWarning::error(format!(
                            "{field} is required when email is configured"
                        )));
                    }
                }
                if email.username.is_some() != email.password.is_some() {
                    warnings.push(ConfigWarning::error(
                        "email.username and email.password must be set together",
                    ));
                }
            }
        }

        if self.retry.backoff_factor < 1.0 {
            warnings.push(ConfigWarning::warning(format!(
                "retry.backoff_factor={} shrinks delays between attempts",
                self.retry.backoff_factor
            )));
        }

        warnings
    }

    /// Fail on any error-level finding; warnings are logged.
    pub fn ensure_valid(&self) -> Result<()> {
        let mut errors = Vec::new();
        for w in self.validate() {
            match w.level {
                WarnLevel::Error => errors.push(w.message),
                WarnLevel::Warning => tracing::warn!("{}", w.message),
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(RelayError::Config(errors.join("; ")))
        }
    }
}

fn mask(secret: &str) -> String {
    if secret.is_empty() {
        String::new()
    } else {
        "********".to_string()
    }
}
