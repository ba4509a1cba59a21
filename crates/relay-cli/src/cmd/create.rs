use anyhow::Result;
use relay_core::OutcomeStatus;
use relay_server::AppState;

use crate::output::{print_json, print_table};
use crate::settings::ConfigArgs;

/// Run a batch through the pipeline, same as `POST /create-incidents`.
pub fn run(settings: &ConfigArgs, keys: Vec<String>, json: bool) -> Result<()> {
    let config = settings.load_validated()?;
    let state = AppState::from_config(&config)?;

    let rt = super::runtime()?;
    let results = rt.block_on(state.pipeline.run_batch(&keys))?;

    if json {
        print_json(&results)?;
    } else {
        let rows = results
            .iter()
            .map(|r| {
                let status = match r.status {
                    OutcomeStatus::IncidentCreated => "incident_created",
                    OutcomeStatus::NotFound => "not_found",
                    OutcomeStatus::Error => "error",
                };
                let detail = match (&r.ticket, &r.error) {
                    (Some(t), _) => format!("{} {}", t.number, t.link),
                    (None, Some(e)) => e.clone(),
                    (None, None) => String::new(),
                };
                vec![r.project_key.clone(), status.to_string(), detail]
            })
            .collect();
        print_table(&["PROJECT", "STATUS", "DETAIL"], rows);
    }

    let failed = results
        .iter()
        .filter(|r| r.status == OutcomeStatus::Error)
        .count();
    if failed > 0 {
        anyhow::bail!("{failed} of {} project key(s) failed", results.len());
    }
    Ok(())
}
