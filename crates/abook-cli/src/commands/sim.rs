use abook_config::AbookConfig;
use abook_sim::Sim;
use anyhow::Context;

pub async fn run(config: AbookConfig, seed: u64, steps: usize, json: bool) -> anyhow::Result<()> {
    // Simulations run on their own current-thread runtime with virtual time.
    let report = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build()
            .context("failed to start simulation runtime")?;
        Ok(rt.block_on(async move {
            let mut sim = Sim::new(seed, &config).await;
            sim.run(steps).await;
            sim.report()
        }))
    })
    .await
    .context("simulation panicked")??;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Simulation seed {} ({} steps)", report.seed, report.steps);
        println!("  commands:   {} submitted", report.submitted);
        println!(
            "  results:    {} successful, {} failed, {} cancelled",
            report.successful, report.failed, report.cancelled
        );
        println!(
            "  user:       {} prompts, {} alerts",
            report.prompts, report.alerts
        );
        println!(
            "  remote:     {} failures, {} delays, {} mutations, {} insertions injected",
            report.injected_failures,
            report.injected_delays,
            report.remote_mutations,
            report.remote_insertions
        );
        println!("  syncs:      {}", report.syncs);
        println!("  quota left: {}", report.quota_remaining);
        for violation in &report.violations {
            eprintln!("VIOLATION {violation}");
        }
    }

    if !report.violations.is_empty() {
        anyhow::bail!("{} invariant violation(s)", report.violations.len());
    }
    Ok(())
}
