use anyhow::Result;
use relay_core::config::WarnLevel;

use crate::output::print_json;
use crate::settings::ConfigArgs;

/// Print the effective configuration (secrets masked) and every validation
/// finding. Exits non-zero if any finding is an error.
pub fn run(settings: &ConfigArgs, json: bool) -> Result<()> {
    let config = settings.resolve()?;
    let warnings = config.validate();

    if json {
        print_json(&serde_json::json!({
            "config": config.redacted(),
            "warnings": warnings,
        }))?;
    } else {
        print!("{}", serde_yaml::to_string(&config.redacted())?);
        for w in &warnings {
            let tag = match w.level {
                WarnLevel::Error => "error",
                WarnLevel::Warning => "warning",
            };
            eprintln!("{tag}: {}", w.message);
        }
    }

    let errors = warnings
        .iter()
        .filter(|w| w.level == WarnLevel::Error)
        .count();
    if errors > 0 {
        anyhow::bail!("configuration has {errors} error(s)");
    }
    Ok(())
}
