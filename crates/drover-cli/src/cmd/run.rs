use anyhow::{Context, Result};
use browser_agent::BrowserActorFactory;
use drover_core::config::Config;
use drover_core::decision::{DecisionSource, TableDecisionSource};
use drover_core::record::JsonlRecordLog;
use drover_core::supervisor::{Collaborators, FinalReport};
use drover_core::Supervisor;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(config_path: &Path, json: bool) -> Result<()> {
    let config = Config::load(config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let records = Arc::new(JsonlRecordLog::new(&config.records_path));
    let decisions: Arc<dyn DecisionSource> = match &config.decision_table {
        Some(path) => Arc::new(
            TableDecisionSource::load(path)
                .with_context(|| format!("failed to load decision table {}", path.display()))?,
        ),
        // No table configured: every item resolves to Unsure.
        None => Arc::new(TableDecisionSource::from_table(HashMap::new())),
    };
    let factory = Arc::new(BrowserActorFactory::new(config.actor_command.clone()));

    let supervisor = Supervisor::new(
        config,
        Collaborators {
            factory,
            decisions,
            records: records.clone(),
            record_source: records,
        },
    );

    let rt = tokio::runtime::Runtime::new()?;
    let report = rt.block_on(async move {
        tokio::select! {
            report = supervisor.run() => report.map(Some),
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("interrupted, shutting down");
                Ok(None)
            }
        }
    })?;

    match report {
        Some(report) => print_report(&report, json),
        None => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_report(report: &FinalReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!();
    println!("run finished after {} rotation(s)", report.rotations);
    for account in &report.accounts {
        let state = if account.progress >= account.quota {
            "met"
        } else if account.unresolved {
            "UNRESOLVED"
        } else {
            "unmet"
        };
        println!(
            "  {:<24} {:>4}/{:<4} {state}  (restarts: {})",
            account.id, account.progress, account.quota, account.restart_count
        );
    }
    let unresolved = report.unresolved();
    if !unresolved.is_empty() {
        println!();
        println!(
            "{} account(s) exhausted their restart budget with quota unmet:",
            unresolved.len()
        );
        for account in unresolved {
            println!(
                "  {} ({}/{} done, {} restarts)",
                account.id, account.progress, account.quota, account.restart_count
            );
        }
    }
    if report.degraded_durability {
        println!();
        println!("warning: ledger writes failed during the run (degraded durability)");
    }
    Ok(())
}
