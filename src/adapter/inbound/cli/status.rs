//! Handler for the `status` command.

use std::path::Path;

use serde_json::json;

use crate::adapter::inbound::cli::output;
use crate::adapter::outbound::controller::HttpControllerClient;
use crate::domain::run::RunStatus;
use crate::error::Result;
use crate::infrastructure::config::settings::Config;
use crate::port::outbound::controller::ControllerClient;

/// Fetch and print the status of one run.
pub async fn execute(config_path: &Path, run_id: &str) -> Result<()> {
    let config = Config::load(config_path)?;
    let controller = HttpControllerClient::from_config(&config.controller);
    controller.connect().await?;
    let status = controller.run_status(run_id).await?;

    if output::is_json() {
        println!("{}", status_json(run_id, &status));
        return Ok(());
    }

    output::header(env!("CARGO_PKG_VERSION"));
    output::field("Controller", controller.address());
    output::field("Run", run_id);
    output::field("Status", status.status.as_str());
    if let Some(sub_status) = &status.sub_status {
        output::field("Sub status", sub_status);
    }
    if let Some(progress) = status.progress {
        output::field("Progress", format!("{progress}%"));
    }
    if let Some(elapsed) = status.time_elapsed {
        output::field("Elapsed", format!("{elapsed}s"));
    }
    if let Some(remaining) = status.time_remaining {
        output::field("Remaining", format!("{remaining}s"));
    }
    if let Some(result_id) = &status.result_id {
        output::field("Result", result_id);
    }
    Ok(())
}

fn status_json(run_id: &str, status: &RunStatus) -> serde_json::Value {
    json!({
        "command": "status",
        "run_id": run_id,
        "status": status.status.as_str(),
        "sub_status": status.sub_status,
        "progress": status.progress,
        "time_elapsed": status.time_elapsed,
        "time_remaining": status.time_remaining,
        "result_id": status.result_id,
    })
}
