use anyhow::{Context, Result};
use drover_core::config::Config;
use drover_core::ledger::{AccountStatus, StatusLedger};
use drover_core::progress::ProgressStore;
use drover_core::record::JsonlRecordLog;
use std::path::Path;

pub fn run(config_path: &Path, json: bool) -> Result<()> {
    let config = Config::load(config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let ledger = StatusLedger::open(&config.ledger_path);
    let records = JsonlRecordLog::new(&config.records_path);
    let progress = ProgressStore::new(&config.accounts);
    progress.refresh(&records);

    if json {
        let accounts: Vec<serde_json::Value> = config
            .accounts
            .iter()
            .map(|account| {
                let record = ledger.record(&account.id);
                serde_json::json!({
                    "id": account.id,
                    "quota": account.quota,
                    "progress": progress.progress(&account.id),
                    "remaining": progress.remaining(&account.id),
                    "quota_met": progress.quota_met(&account.id),
                    "status": record.as_ref().map(|r| r.status),
                    "restart_count": record.as_ref().map(|r| r.restart_count).unwrap_or(0),
                    "last_error": record.as_ref().and_then(|r| r.error.clone()),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&accounts)?);
        return Ok(());
    }

    println!(
        "{:<24} {:<12} {:>9}  {:>8}  {}",
        "ACCOUNT", "STATUS", "PROGRESS", "RESTARTS", "LAST ERROR"
    );
    for account in &config.accounts {
        let record = ledger.record(&account.id);
        let status = match record.as_ref().map(|r| r.status) {
            Some(AccountStatus::Pending) | None => "pending",
            Some(AccountStatus::Running) => "running",
            Some(AccountStatus::Completed) => "completed",
            Some(AccountStatus::Crashed) => "crashed",
            Some(AccountStatus::Restarting) => "restarting",
        };
        let error = record
            .as_ref()
            .and_then(|r| r.error.as_deref())
            .unwrap_or("-");
        let error_short: String = error.chars().take(60).collect();
        println!(
            "{:<24} {:<12} {:>4}/{:<4}  {:>8}  {}",
            account.id,
            status,
            progress.progress(&account.id),
            account.quota,
            record.as_ref().map(|r| r.restart_count).unwrap_or(0),
            error_short
        );
    }
    Ok(())
}
