use crate::utils::{self, Loaded};
use colored::Colorize;

pub fn handle(loaded: &Loaded, json: bool) -> anyhow::Result<()> {
    let plan = utils::synthesize(&loaded.topology)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    utils::print_loaded(loaded);
    println!();
    print!("{}", plan);
    println!();
    println!("{}", plan.summary().to_string().bold());

    if !plan.outputs.is_empty() {
        println!();
        println!("Outputs:");
        for output in &plan.outputs {
            println!("  {} = {}", output.name.cyan(), output.template);
        }
    }

    Ok(())
}
