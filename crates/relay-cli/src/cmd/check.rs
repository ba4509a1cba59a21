use anyhow::Result;
use relay_server::AppState;

use crate::output::{print_json, print_table};
use crate::settings::ConfigArgs;

/// One-shot version of `GET /healthz?deep=true`.
pub fn run(settings: &ConfigArgs, json: bool) -> Result<()> {
    let config = settings.load_validated()?;
    let state = AppState::from_config(&config)?;

    let rt = super::runtime()?;
    let (sonar, snow) = rt.block_on(async {
        tokio::join!(
            state.pipeline.sonar().ping(),
            state.pipeline.servicenow().exchange_credentials()
        )
    });

    let checks = [
        ("sonarqube", sonar.map(|_| ()).err()),
        ("servicenow", snow.map(|_| ()).err()),
    ];

    if json {
        let body: serde_json::Map<String, serde_json::Value> = checks
            .iter()
            .map(|(name, err)| {
                let v = match err {
                    None => serde_json::json!({ "ok": true }),
                    Some(e) => serde_json::json!({ "ok": false, "error": e.to_string() }),
                };
                (name.to_string(), v)
            })
            .collect();
        print_json(&body)?;
    } else {
        let rows = checks
            .iter()
            .map(|(name, err)| {
                vec![
                    name.to_string(),
                    if err.is_none() { "ok" } else { "failed" }.to_string(),
                    err.as_ref().map(|e| e.to_string()).unwrap_or_default(),
                ]
            })
            .collect();
        print_table(&["SERVICE", "STATUS", "DETAIL"], rows);
    }

    let failed = checks.iter().filter(|(_, e)| e.is_some()).count();
    if failed > 0 {
        anyhow::bail!("{failed} downstream check(s) failed");
    }
    Ok(())
}
