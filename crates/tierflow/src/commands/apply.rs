use crate::utils::{self, Loaded};
use colored::Colorize;
use std::sync::Arc;
use tierflow_cloud::{Executor, FailurePolicy, SimulatedBackend, StateManager};

pub async fn handle(loaded: &Loaded, max_parallel: usize, halt_on_failure: bool) -> anyhow::Result<()> {
    let topology = &loaded.topology;
    let plan = utils::synthesize(topology)?;
    utils::print_loaded(loaded);

    let manager = StateManager::new(&loaded.project_root);
    let lock = manager.acquire_lock().await?;
    let mut state = manager.load(&topology.stack.name).await?;
    for id in state.prune(&plan) {
        println!("  {} {} (no longer declared, forgotten)", "-".dimmed(), id);
    }

    let failure_policy = if halt_on_failure {
        FailurePolicy::HaltAll
    } else {
        FailurePolicy::ContinueIndependent
    };
    let backend = Arc::new(SimulatedBackend::new(&topology.stack));
    let executor = Executor::new(backend)
        .with_max_parallel(max_parallel)
        .with_failure_policy(failure_policy);

    println!(
        "{}",
        format!("Applying {} steps (max {} in parallel)...", plan.len(), max_parallel).blue()
    );
    let report = executor.apply(topology, &plan, state.handles.clone()).await;

    // record whatever exists, complete or not, so the next run resumes
    state.replace_handles(report.handles.clone());
    manager.save(&state).await?;
    lock.release().await?;

    for id in &report.reused {
        println!("  {} {} (existing)", "=".dimmed(), id);
    }
    for id in &report.succeeded {
        let provider_id = report
            .handles
            .get(id)
            .map(|h| h.provider_id.as_str())
            .unwrap_or_default();
        println!("  {} {} {}", "✓".green(), id, provider_id.dimmed());
    }
    for failure in &report.failed {
        println!("  {} {}: {}", "✗".red(), failure.id, failure.error);
    }
    for skipped in &report.skipped {
        println!(
            "  {} {} (blocked by {})",
            "-".yellow(),
            skipped.id,
            skipped.blocked_by
        );
    }
    for id in &report.not_started {
        println!("  {} {} (not started)", "-".yellow(), id);
    }

    println!();
    if !report.is_success() {
        anyhow::bail!(
            "apply incomplete after {}ms: {} failed, {} skipped, {} not started",
            report.duration_ms,
            report.failed.len(),
            report.skipped.len(),
            report.not_started.len()
        );
    }

    println!(
        "{}",
        format!(
            "✓ Applied in {}ms ({} created, {} existing)",
            report.duration_ms,
            report.succeeded.len(),
            report.reused.len()
        )
        .green()
        .bold()
    );

    let outputs = tierflow_core::resolve(&plan, &report.handles)?;
    if !outputs.is_empty() {
        println!();
        println!("Outputs:");
        for output in &outputs {
            println!("  {} = {}", output.name.cyan(), output.value);
        }
    }

    Ok(())
}
