use clap::Parser;
use std::sync::Arc;
use tg_provision::core::{PlannedStatus, PlannedStep};
use tg_provision::utils::{error::ProvisionError, logger, validation::Validate};
use tg_provision::{CliConfig, LogFormat, ProvisionEngine, StepFilter, SystemRunner};

fn print_plan(steps: &[PlannedStep]) {
    for (index, step) in steps.iter().enumerate() {
        println!("{:>2}. {} [{}]", index + 1, step.name, step.status);
        if step.status == PlannedStatus::Pending {
            for action in &step.actions {
                println!("      {}", action);
            }
        }
    }
}

fn fail(e: &ProvisionError) -> ! {
    tracing::error!(
        "❌ Provisioning failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    if let Some(step) = e.failed_step() {
        tracing::error!("🧱 Failed step: {} (completed steps are kept for resume)", step);
    }
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 建議: {}", e.recovery_suggestion());

    std::process::exit(e.exit_code());
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    match cli.log_format {
        LogFormat::Compact => logger::init_cli_logger(cli.verbose),
        LogFormat::Json => logger::init_json_logger(cli.verbose),
    }

    tracing::info!("Starting tg-provision");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => fail(&e),
    };
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        fail(&e);
    }

    let runner = Arc::new(SystemRunner::new().with_working_dir(config.project.root.clone()));
    let engine = ProvisionEngine::new(config, runner)
        .with_filter(StepFilter::new(cli.only.clone(), cli.skip.clone()))
        .with_fresh(cli.fresh)
        .with_preflight(!cli.skip_preflight);

    if cli.status {
        let (state, steps) = match engine.status().await {
            Ok(status) => status,
            Err(e) => fail(&e),
        };
        match state {
            Some(state) => {
                println!("Execution: {}", state.execution_id);
                println!("Started:   {}", state.started_at.to_rfc3339());
                println!("Updated:   {}", state.updated_at.to_rfc3339());
                for completed in &state.completed {
                    println!(
                        "  ✅ {} at {} ({}ms)",
                        completed.step,
                        completed.completed_at.to_rfc3339(),
                        completed.duration_ms
                    );
                }
            }
            None => println!("No provisioning state recorded yet."),
        }
        for step in steps.iter().filter(|s| s.status == PlannedStatus::Pending) {
            println!("  ⏳ {}", step.name);
        }
        if cli.verbose {
            let state_path = engine.config().state_file_path();
            tracing::debug!("State file: {}", state_path.display());
        }
        return Ok(());
    }

    if cli.dry_run {
        let steps = match engine.plan().await {
            Ok(steps) => steps,
            Err(e) => fail(&e),
        };
        println!("Dry run for {} (nothing will be changed):", engine.execution_id());
        print_plan(&steps);
        return Ok(());
    }

    match engine.run().await {
        Ok(report) => {
            tracing::info!("✅ Provisioning completed successfully!");
            println!("✅ Provisioning {} completed successfully!", report.execution_id);
            for warning in &report.warnings {
                println!("⚠️ {}", warning);
            }
            if !report.follow_up.is_empty() {
                println!("👉 To start the services:");
                for command in &report.follow_up {
                    println!("   {}", command);
                }
            }
            if cli.verbose {
                let summary = serde_json::to_string_pretty(&report.results.iter().map(|r| {
                    serde_json::json!({
                        "step": r.step_name,
                        "outcome": r.outcome,
                        "duration_ms": r.duration.as_millis() as u64,
                        "metadata": r.metadata,
                    })
                }).collect::<Vec<_>>())?;
                println!("{}", summary);
            }
        }
        Err(e) => fail(&e),
    }

    Ok(())
}
