use anyhow::Result;
use relay_server::AppState;

use crate::settings::ConfigArgs;

pub fn run(settings: &ConfigArgs, port: u16) -> Result<()> {
    let config = settings.load_validated()?;
    let state = AppState::from_config(&config)?;

    tracing::info!(
        sonarqube = %config.sonarqube.url,
        servicenow = %config.servicenow.instance_url,
        notifications = config.email.is_some(),
        "starting relay"
    );

    let rt = super::runtime()?;
    rt.block_on(relay_server::serve(state, port))
}
