use crate::error::{DroverError, Result};
use crate::types::Account;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// WorkWindow
// ---------------------------------------------------------------------------

/// Daily time-of-day range during which sessions may run. `start_hour` >
/// `end_hour` means an overnight shift that wraps past midnight.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkWindow {
    #[serde(default = "default_window_start")]
    pub start_hour: u32,
    #[serde(default = "default_window_end")]
    pub end_hour: u32,
    #[serde(default)]
    pub enabled: bool,
}

fn default_window_start() -> u32 {
    8
}

fn default_window_end() -> u32 {
    18
}

impl Default for WorkWindow {
    fn default() -> Self {
        Self {
            start_hour: default_window_start(),
            end_hour: default_window_end(),
            enabled: false,
        }
    }
}

// ---------------------------------------------------------------------------
// PacingConfig
// ---------------------------------------------------------------------------

/// Human-like delay ranges (seconds) applied before acting on an item,
/// keyed by the kind of decision being applied.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PacingConfig {
    #[serde(default = "default_accept_min")]
    pub accept_min: f64,
    #[serde(default = "default_accept_max")]
    pub accept_max: f64,
    #[serde(default = "default_revise_min")]
    pub revise_min: f64,
    #[serde(default = "default_revise_max")]
    pub revise_max: f64,
    #[serde(default = "default_reject_min")]
    pub reject_min: f64,
    #[serde(default = "default_reject_max")]
    pub reject_max: f64,
    #[serde(default = "default_submit_min")]
    pub submit_jitter_min: f64,
    #[serde(default = "default_submit_max")]
    pub submit_jitter_max: f64,
}

fn default_accept_min() -> f64 {
    10.0
}
fn default_accept_max() -> f64 {
    15.0
}
fn default_revise_min() -> f64 {
    12.0
}
fn default_revise_max() -> f64 {
    25.0
}
fn default_reject_min() -> f64 {
    17.0
}
fn default_reject_max() -> f64 {
    23.0
}
fn default_submit_min() -> f64 {
    1.0
}
fn default_submit_max() -> f64 {
    3.0
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            accept_min: default_accept_min(),
            accept_max: default_accept_max(),
            revise_min: default_revise_min(),
            revise_max: default_revise_max(),
            reject_min: default_reject_min(),
            reject_max: default_reject_max(),
            submit_jitter_min: default_submit_min(),
            submit_jitter_max: default_submit_max(),
        }
    }
}

impl PacingConfig {
    /// Zeroed pacing for tests and dry runs.
    pub fn none() -> Self {
        Self {
            accept_min: 0.0,
            accept_max: 0.0,
            revise_min: 0.0,
            revise_max: 0.0,
            reject_min: 0.0,
            reject_max: 0.0,
            submit_jitter_min: 0.0,
            submit_jitter_max: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// ActorCommand
// ---------------------------------------------------------------------------

/// External actor program: spawned once per session, spoken to over stdio.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ActorCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Capacity floor: the scheduler keeps this many sessions alive while
    /// work remains.
    #[serde(default = "default_min_sessions")]
    pub min_sessions: usize,

    /// Seconds between health-monitor sweeps.
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,

    /// Restart budget per account before it is reported as unresolved.
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,

    /// Cap on work items per account per rotation.
    #[serde(default = "default_tasks_per_rotation")]
    pub tasks_per_rotation: u32,

    #[serde(default)]
    pub work_window: WorkWindow,

    #[serde(default)]
    pub pacing: PacingConfig,

    #[serde(default)]
    pub actor_command: ActorCommand,

    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,

    #[serde(default = "default_records_path")]
    pub records_path: PathBuf,

    /// Optional decision table consulted for item decisions.
    #[serde(default)]
    pub decision_table: Option<PathBuf>,

    pub accounts: Vec<Account>,
}

fn default_min_sessions() -> usize {
    1
}

fn default_check_interval() -> u64 {
    45
}

fn default_max_restarts() -> u32 {
    3
}

fn default_tasks_per_rotation() -> u32 {
    100
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("account_status.yaml")
}

fn default_records_path() -> PathBuf {
    PathBuf::from("completed_records.jsonl")
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.accounts.is_empty() {
            return Err(DroverError::InvalidConfig("no accounts configured".into()));
        }
        if self.min_sessions == 0 {
            return Err(DroverError::InvalidConfig(
                "min_sessions must be at least 1".into(),
            ));
        }
        if self.work_window.start_hour > 23 || self.work_window.end_hour > 23 {
            return Err(DroverError::InvalidConfig(
                "work_window hours must be in 0..=23".into(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for account in &self.accounts {
            if account.quota == 0 {
                return Err(DroverError::InvalidConfig(format!(
                    "account '{}' has a zero quota",
                    account.id
                )));
            }
            if !seen.insert(account.id.as_str()) {
                return Err(DroverError::InvalidConfig(format!(
                    "duplicate account id '{}'",
                    account.id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Credential;

    fn account(id: &str, quota: u32) -> Account {
        Account {
            id: id.into(),
            credential: Credential::new("pw"),
            quota,
        }
    }

    fn minimal() -> Config {
        Config {
            min_sessions: 1,
            check_interval_secs: 45,
            max_restarts: 3,
            tasks_per_rotation: 100,
            work_window: WorkWindow::default(),
            pacing: PacingConfig::default(),
            actor_command: ActorCommand::default(),
            ledger_path: default_ledger_path(),
            records_path: default_records_path(),
            decision_table: None,
            accounts: vec![account("g007", 10)],
        }
    }

    #[test]
    fn parse_with_defaults() {
        let yaml = r#"
accounts:
  - id: g007
    credential: secret
    quota: 100
  - id: g008
    credential: secret2
    quota: 50
work_window:
  start_hour: 20
  end_hour: 8
  enabled: true
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.min_sessions, 1);
        assert_eq!(config.check_interval_secs, 45);
        assert_eq!(config.tasks_per_rotation, 100);
        assert_eq!(config.accounts.len(), 2);
        assert!(config.work_window.enabled);
        assert_eq!(config.work_window.start_hour, 20);
    }

    #[test]
    fn rejects_empty_accounts() {
        let mut config = minimal();
        config.accounts.clear();
        assert!(matches!(
            config.validate(),
            Err(DroverError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let mut config = minimal();
        config.accounts.push(account("g007", 5));
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_quota() {
        let mut config = minimal();
        config.accounts[0].quota = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_hours() {
        let mut config = minimal();
        config.work_window.start_hour = 24;
        assert!(config.validate().is_err());
    }
}
