//! Assemble a [`RelayConfig`] from an optional YAML file plus flags and
//! environment variables. Flags and env win over the file.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use relay_core::config::{EmailConfig, RelayConfig};

#[derive(Args, Debug, Default, Clone)]
pub struct ConfigArgs {
    /// YAML config file; flags and environment variables override it
    #[arg(long, global = true, env = "RELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// SonarQube base URL
    #[arg(long, global = true, env = "SONARQUBE_URL")]
    pub sonarqube_url: Option<String>,

    /// SonarQube user token
    #[arg(long, global = true, env = "SONARQUBE_TOKEN", hide_env_values = true)]
    pub sonarqube_token: Option<String>,

    /// ServiceNow instance URL
    #[arg(long, global = true, env = "SERVICENOW_INSTANCE_URL")]
    pub servicenow_instance_url: Option<String>,

    /// ServiceNow OAuth client id
    #[arg(long, global = true, env = "SERVICENOW_CLIENT_ID")]
    pub servicenow_client_id: Option<String>,

    /// ServiceNow OAuth client secret
    #[arg(long, global = true, env = "SERVICENOW_CLIENT_SECRET", hide_env_values = true)]
    pub servicenow_client_secret: Option<String>,

    /// Assignment group for created incidents
    #[arg(long, global = true, env = "SERVICENOW_ASSIGNMENT_GROUP")]
    pub servicenow_assignment_group: Option<String>,

    /// Caller sys_id for created incidents
    #[arg(long, global = true, env = "SERVICENOW_CALLER_ID")]
    pub servicenow_caller_id: Option<String>,

    /// Category for created incidents
    #[arg(long, global = true, env = "SERVICENOW_CATEGORY")]
    pub servicenow_category: Option<String>,

    /// SMTP host; notifications are disabled without it
    #[arg(long, global = true, env = "SMTP_HOST")]
    pub smtp_host: Option<String>,

    #[arg(long, global = true, env = "SMTP_PORT")]
    pub smtp_port: Option<u16>,

    #[arg(long, global = true, env = "SMTP_USERNAME")]
    pub smtp_username: Option<String>,

    #[arg(long, global = true, env = "SMTP_PASSWORD", hide_env_values = true)]
    pub smtp_password: Option<String>,

    /// Use STARTTLS when talking to the SMTP host
    #[arg(long, global = true, env = "SMTP_STARTTLS")]
    pub smtp_starttls: Option<bool>,

    /// Sender address for notifications
    #[arg(long, global = true, env = "NOTIFY_FROM")]
    pub notify_from: Option<String>,

    /// Comma-separated recipients for notifications
    #[arg(long, global = true, env = "NOTIFY_TO")]
    pub notify_to: Option<String>,
}

impl ConfigArgs {
    /// Merge file, flags and environment into a config. Does not validate.
    pub fn resolve(&self) -> Result<RelayConfig> {
        let mut cfg = match &self.config {
            Some(path) => RelayConfig::load(path)?,
            None => RelayConfig::default(),
        };

        overlay(&mut cfg.sonarqube.url, &self.sonarqube_url);
        overlay(&mut cfg.sonarqube.token, &self.sonarqube_token);
        overlay(&mut cfg.servicenow.instance_url, &self.servicenow_instance_url);
        overlay(&mut cfg.servicenow.client_id, &self.servicenow_client_id);
        overlay(&mut cfg.servicenow.client_secret, &self.servicenow_client_secret);
        overlay_opt(
            &mut cfg.servicenow.assignment_group,
            &self.servicenow_assignment_group,
        );
        overlay_opt(&mut cfg.servicenow.caller_id, &self.servicenow_caller_id);
        overlay_opt(&mut cfg.servicenow.category, &self.servicenow_category);

        if let Some(host) = &self.smtp_host {
            let email = cfg.email.get_or_insert_with(|| EmailConfig {
                host: String::new(),
                port: 587,
                username: None,
                password: None,
                from: String::new(),
                to: String::new(),
                starttls: true,
            });
            email.host = host.clone();
        }
        if let Some(email) = cfg.email.as_mut() {
            if let Some(port) = self.smtp_port {
                email.port = port;
            }
            if let Some(starttls) = self.smtp_starttls {
                email.starttls = starttls;
            }
            overlay_opt(&mut email.username, &self.smtp_username);
            overlay_opt(&mut email.password, &self.smtp_password);
            overlay(&mut email.from, &self.notify_from);
            overlay(&mut email.to, &self.notify_to);
        }

        Ok(cfg)
    }

    /// Resolve and fail on any error-level validation finding.
    pub fn load_validated(&self) -> Result<RelayConfig> {
        let cfg = self.resolve()?;
        cfg.ensure_valid()?;
        Ok(cfg)
    }
}

fn overlay(target: &mut String, value: &Option<String>) {
    if let Some(v) = value {
        *target = v.clone();
    }
}

fn overlay_opt(target: &mut Option<String>, value: &Option<String>) {
    if let Some(v) = value {
        *target = Some(v.clone());
    }
}
