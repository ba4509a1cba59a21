use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ProjectRef
// ---------------------------------------------------------------------------

/// A SonarQube project as resolved by key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRef {
    pub key: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl ProjectRef {
    /// Human label: the name when known, otherwise the key.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.key)
    }
}

// ---------------------------------------------------------------------------
// Ticket
// ---------------------------------------------------------------------------

/// A ServiceNow incident as returned by the table API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub number: String,
    pub sys_id: String,
}

impl Ticket {
    /// Deep link into the ServiceNow UI for this incident.
    pub fn link(&self, instance_url: &str) -> String {
        format!(
            "{}/nav_to.do?uri=incident.do?sys_id={}",
            instance_url.trim_end_matches('/'),
            self.sys_id
        )
    }
}

// ---------------------------------------------------------------------------
// Trigger: what caused the incident
// ---------------------------------------------------------------------------

/// Where an incident request came from. Webhook-triggered incidents are
/// filed at a higher severity than ad hoc batch requests.
#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    /// Manual batch request via `POST /create-incidents` or the CLI.
    Batch,
    /// A failed quality gate reported by a SonarQube webhook.
    QualityGate(Box<WebhookEvent>),
}

impl Trigger {
    /// ServiceNow urgency and impact, as the table API expects them.
    pub fn urgency_impact(&self) -> (&'static str, &'static str) {
        match self {
            Trigger::QualityGate(_) => ("2", "2"),
            Trigger::Batch => ("3", "3"),
        }
    }
}

// ---------------------------------------------------------------------------
// TicketPayload
// ---------------------------------------------------------------------------

/// Body of a ServiceNow incident creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TicketPayload {
    pub short_description: String,
    pub description: String,
    pub urgency: String,
    pub impact: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignment_group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// Optional routing fields attached to every incident.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketRouting {
    pub assignment_group: Option<String>,
    pub caller_id: Option<String>,
    pub category: Option<String>,
}

impl TicketPayload {
    pub fn build(project: &ProjectRef, trigger: &Trigger, routing: &TicketRouting) -> Self {
        let (urgency, impact) = trigger.urgency_impact();
        let name = project.display_name();

        let (short_description, description) = match trigger {
            Trigger::Batch => (
                format!("SonarQube quality issue: {name}"),
                format!(
                    "An incident was requested for SonarQube project '{name}' (key: {}).",
                    project.key
                ),
            ),
            Trigger::QualityGate(event) => {
                let status = &event.quality_gate.status;
                let mut description = format!(
                    "Quality gate '{}' reported status {status} for SonarQube project '{name}' (key: {}).",
                    event.quality_gate.name.as_deref().unwrap_or("default"),
                    project.key
                );
                if let Some(branch) = &event.branch {
                    description.push_str(&format!("\nBranch: {}", branch.name));
                }
                if let Some(at) = &event.analysed_at {
                    description.push_str(&format!("\nAnalysed at: {at}"));
                }
                if let Some(rev) = &event.revision {
                    description.push_str(&format!("\nRevision: {rev}"));
                }
                let failing: Vec<_> = event.failing_conditions().collect();
                if !failing.is_empty() {
                    description.push_str("\n\nFailing conditions:");
                    for c in failing {
                        description.push_str(&format!("\n- {}", c.summary()));
                    }
                }
                if let Some(url) = event.dashboard_url() {
                    description.push_str(&format!("\n\nDashboard: {url}"));
                }
                (
                    format!("SonarQube quality gate {status}: {name}"),
                    description,
                )
            }
        };

        Self {
            short_description,
            description,
            urgency: urgency.to_string(),
            impact: impact.to_string(),
            assignment_group: routing.assignment_group.clone(),
            caller_id: routing.caller_id.clone(),
            category: routing.category.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// WebhookEvent: SonarQube project analysis webhook
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    pub project: WebhookProject,
    pub quality_gate: QualityGate,
    #[serde(default)]
    pub server_url: Option<String>,
    #[serde(default)]
    pub analysed_at: Option<String>,
    #[serde(default)]
    pub revision: Option<String>,
    #[serde(default)]
    pub branch: Option<Branch>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WebhookProject {
    pub key: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QualityGate {
    pub status: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub conditions: Vec<GateCondition>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateCondition {
    pub metric: String,
    pub status: String,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub error_threshold: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

impl GateCondition {
    fn summary(&self) -> String {
        let mut s = self.metric.clone();
        if let Some(v) = &self.value {
            s.push_str(&format!(" = {v}"));
        }
        if let Some(t) = &self.error_threshold {
            let op = match self.operator.as_deref() {
                Some("GREATER_THAN") => ">",
                Some("LESS_THAN") => "<",
                _ => "vs",
            };
            s.push_str(&format!(" (threshold {op} {t})"));
        }
        s
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Branch {
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

impl WebhookEvent {
    /// A passing gate needs no incident.
    pub fn gate_passed(&self) -> bool {
        self.quality_gate.status == "OK"
    }

    pub fn failing_conditions(&self) -> impl Iterator<Item = &GateCondition> {
        self.quality_gate
            .conditions
            .iter()
            .filter(|c| c.status == "ERROR")
    }

    pub fn dashboard_url(&self) -> Option<String> {
        self.server_url.as_deref().map(|base| {
            format!(
                "{}/dashboard?id={}",
                base.trim_end_matches('/'),
                self.project.key
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failing_event() -> WebhookEvent {
        serde_json::from_str(
            r#"{
                "serverUrl": "https://sonar.example.com/",
                "analysedAt": "2024-05-01T10:00:00+0000",
                "revision": "abc123",
                "project": {"key": "svc-api", "name": "Service API"},
                "branch": {"name": "main", "type": "BRANCH"},
                "qualityGate": {
                    "name": "Sonar way",
                    "status": "ERROR",
                    "conditions": [
                        {"metric": "new_coverage", "operator": "LESS_THAN", "status": "ERROR",
                         "errorThreshold": "80", "value": "42.0"},
                        {"metric": "new_bugs", "operator": "GREATER_THAN", "status": "OK",
                         "errorThreshold": "0", "value": "0"}
                    ]
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn minimal_webhook_parses() {
        let event: WebhookEvent = serde_json::from_str(
            r#"{"project": {"key": "k"}, "qualityGate": {"status": "OK"}}"#,
        )
        .unwrap();
        assert!(event.gate_passed());
        assert!(event.project.name.is_none());
        assert!(event.dashboard_url().is_none());
    }

    #[test]
    fn webhook_payload_uses_higher_severity() {
        let project = ProjectRef {
            key: "svc-api".into(),
            name: Some("Service API".into()),
        };
        let trigger = Trigger::QualityGate(Box::new(failing_event()));
        let payload = TicketPayload::build(&project, &trigger, &TicketRouting::default());
        assert_eq!(payload.urgency, "2");
        assert_eq!(payload.impact, "2");
        assert_eq!(
            payload.short_description,
            "SonarQube quality gate ERROR: Service API"
        );
        assert!(payload.description.contains("new_coverage = 42.0 (threshold < 80)"));
        assert!(!payload.description.contains("new_bugs"));
        assert!(payload
            .description
            .contains("Dashboard: https://sonar.example.com/dashboard?id=svc-api"));
        assert!(payload.description.contains("Branch: main"));
    }

    #[test]
    fn batch_payload_uses_lower_severity_and_routing() {
        let project = ProjectRef {
            key: "lib-core".into(),
            name: None,
        };
        let routing = TicketRouting {
            assignment_group: Some("platform".into()),
            caller_id: None,
            category: Some("software".into()),
        };
        let payload = TicketPayload::build(&project, &Trigger::Batch, &routing);
        assert_eq!(payload.urgency, "3");
        assert_eq!(payload.impact, "3");
        assert_eq!(payload.short_description, "SonarQube quality issue: lib-core");

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["assignment_group"], "platform");
        assert_eq!(json["category"], "software");
        assert!(json.get("caller_id").is_none());
    }

    #[test]
    fn ticket_link_strips_trailing_slash() {
        let ticket = Ticket {
            number: "INC0010001".into(),
            sys_id: "9d385017".into(),
        };
        assert_eq!(
            ticket.link("https://acme.service-now.com/"),
            "https://acme.service-now.com/nav_to.do?uri=incident.do?sys_id=9d385017"
        );
    }
}
