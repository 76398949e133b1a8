use crate::utils::{self, Loaded};
use colored::Colorize;

pub fn handle(loaded: &Loaded) -> anyhow::Result<()> {
    println!("{}", "Validating topology...".blue());
    utils::print_loaded(loaded);

    let topology = &loaded.topology;
    let synthesis = match tierflow_core::synthesize_with_report(topology) {
        Ok(synthesis) => synthesis,
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ Topology error".red().bold());
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    };

    println!("{}", "✓ Topology is valid".green().bold());
    println!();
    println!("Summary:");
    println!("  Zones: {}", topology.zones.len());
    for zone in &topology.zones {
        println!(
            "    - {} ({}, {}, {})",
            zone.id.cyan(),
            zone.kind,
            zone.cidr,
            zone.availability_zone
        );
    }
    println!("  Access groups: {}", topology.access_groups.len());
    for group in &topology.access_groups {
        println!(
            "    - {} ({}, {} rules)",
            group.id.cyan(),
            group.tier,
            group.rules.len()
        );
    }
    println!("  Resources: {}", topology.descriptors.len());
    for descriptor in &topology.descriptors {
        println!("    - {} ({})", descriptor.id.cyan(), descriptor.kind());
    }
    println!("  Plan: {}", synthesis.plan.summary());

    if !synthesis.report.advisories.is_empty() {
        println!();
        println!("{}", "Advisories:".yellow());
        for advisory in &synthesis.report.advisories {
            println!("  ⚠ {}", advisory);
        }
    }

    Ok(())
}
