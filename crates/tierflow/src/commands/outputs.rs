use crate::utils::{self, Loaded};
use anyhow::Context;
use colored::Colorize;
use tierflow_cloud::StateManager;

pub async fn handle(loaded: &Loaded, json: bool) -> anyhow::Result<()> {
    let topology = &loaded.topology;
    let plan = utils::synthesize(topology)?;

    let manager = StateManager::new(&loaded.project_root);
    let state = manager.load(&topology.stack.name).await?;
    let outputs = tierflow_core::resolve(&plan, &state.handles)
        .context("outputs are not available yet; run `tier apply` first")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outputs)?);
        return Ok(());
    }

    if outputs.is_empty() {
        println!("{}", "No outputs declared".yellow());
        return Ok(());
    }
    for output in &outputs {
        println!("{} = {}", output.name.cyan(), output.value);
        if let Some(description) = &output.description {
            println!("  {}", description.dimmed());
        }
    }

    Ok(())
}
