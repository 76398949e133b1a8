use crate::utils::{self, Loaded};
use colored::Colorize;

pub fn handle(loaded: &Loaded) -> anyhow::Result<()> {
    utils::print_loaded(loaded);
    let report = tierflow_core::audit(&loaded.topology);

    for violation in &report.violations {
        println!("  {} {}", "✗".red(), violation);
    }
    for advisory in &report.advisories {
        println!("  {} {}", "⚠".yellow(), advisory);
    }

    println!();
    if report.is_clean() {
        println!(
            "{}",
            format!(
                "✓ No violations ({} advisories)",
                report.advisories.len()
            )
            .green()
            .bold()
        );
        Ok(())
    } else {
        eprintln!(
            "{}",
            format!(
                "✗ {} violations, {} advisories",
                report.violations.len(),
                report.advisories.len()
            )
            .red()
            .bold()
        );
        std::process::exit(1);
    }
}
