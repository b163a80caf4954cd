use anyhow::{Context, Result};
use drover_core::config::Config;
use drover_core::ledger::StatusLedger;
use std::path::Path;

pub fn run(config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let ledger = StatusLedger::open(&config.ledger_path);
    let count = ledger.all_records().len();
    ledger.reset();
    println!(
        "cleared {} account record(s) from {}",
        count,
        config.ledger_path.display()
    );
    Ok(())
}
