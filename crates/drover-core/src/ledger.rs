use crate::io;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::{error, info, warn};

/// Error messages longer than this are truncated before persisting.
const MAX_ERROR_LEN: usize = 500;

// ---------------------------------------------------------------------------
// AccountStatus / AccountRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Pending,
    Running,
    Completed,
    Crashed,
    Restarting,
}

/// Durable lifecycle record for one account. Mutated only through the
/// ledger's lifecycle calls; persisted after every mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRecord {
    pub status: AccountStatus,
    pub rotation: u32,
    /// Session budget: how many items this session was asked to complete.
    pub max_tasks: u32,
    /// Items completed within the current/last session.
    pub completed_tasks: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub last_update: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub crashed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub restart_count: u32,
}

impl Default for AccountRecord {
    fn default() -> Self {
        Self {
            status: AccountStatus::Pending,
            rotation: 0,
            max_tasks: 0,
            completed_tasks: 0,
            started_at: None,
            last_update: None,
            completed_at: None,
            crashed_at: None,
            error: None,
            restart_count: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// StatusLedger
// ---------------------------------------------------------------------------

/// File-backed ledger of account lifecycle state, keyed by account id.
///
/// Every mutation is written through synchronously with an atomic
/// temp-then-rename so external tooling never observes a torn file. A write
/// failure does not stop the scheduler; it flips the ledger into degraded
/// mode, which the supervisor reports loudly.
pub struct StatusLedger {
    path: PathBuf,
    accounts: Mutex<HashMap<String, AccountRecord>>,
    degraded: AtomicBool,
}

impl StatusLedger {
    /// Open the ledger at `path`, restoring any previously committed state.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let accounts = match std::fs::read_to_string(&path) {
            Ok(data) => match serde_yaml::from_str::<HashMap<String, AccountRecord>>(&data) {
                Ok(map) => {
                    info!(accounts = map.len(), path = %path.display(), "restored status ledger");
                    map
                }
                Err(e) => {
                    warn!(error = %e, "status ledger unreadable, starting fresh");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self {
            path,
            accounts: Mutex::new(accounts),
            degraded: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, AccountRecord>> {
        self.accounts.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn save(&self, accounts: &HashMap<String, AccountRecord>) {
        let data = match serde_yaml::to_string(accounts) {
            Ok(data) => data,
            Err(e) => {
                error!(error = %e, "failed to serialize status ledger");
                self.degraded.store(true, Ordering::Relaxed);
                return;
            }
        };
        if let Err(e) = io::atomic_write(&self.path, data.as_bytes()) {
            error!(error = %e, path = %self.path.display(), "failed to persist status ledger");
            self.degraded.store(true, Ordering::Relaxed);
        }
    }

    /// True once any persist attempt has failed. Durability is no longer
    /// guaranteed; the in-memory state remains authoritative for this run.
    pub fn degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    // -----------------------------------------------------------------------
    // Lifecycle mutations
    // -----------------------------------------------------------------------

    /// Mark an account as starting a session. Restart count survives across
    /// sessions; everything else resets.
    pub fn start_account(&self, id: &str, rotation: u32, max_tasks: u32) {
        let mut accounts = self.lock();
        let restart_count = accounts.get(id).map(|r| r.restart_count).unwrap_or(0);
        let now = Utc::now();
        accounts.insert(
            id.to_string(),
            AccountRecord {
                status: AccountStatus::Running,
                rotation,
                max_tasks,
                completed_tasks: 0,
                started_at: Some(now),
                last_update: Some(now),
                completed_at: None,
                crashed_at: None,
                error: None,
                restart_count,
            },
        );
        self.save(&accounts);
        info!(account = %id, rotation, max_tasks, "session started");
    }

    pub fn update_progress(&self, id: &str, completed_tasks: u32) {
        let mut accounts = self.lock();
        if let Some(record) = accounts.get_mut(id) {
            record.completed_tasks = completed_tasks;
            record.last_update = Some(Utc::now());
            self.save(&accounts);
        }
    }

    pub fn mark_completed(&self, id: &str, completed_tasks: u32) {
        let mut accounts = self.lock();
        if let Some(record) = accounts.get_mut(id) {
            record.status = AccountStatus::Completed;
            record.completed_tasks = completed_tasks;
            record.completed_at = Some(Utc::now());
            self.save(&accounts);
        }
        info!(account = %id, completed_tasks, "session completed");
    }

    pub fn mark_crashed(&self, id: &str, error_msg: &str) {
        let mut accounts = self.lock();
        let record = accounts.entry(id.to_string()).or_default();
        record.status = AccountStatus::Crashed;
        record.error = Some(truncate(error_msg, MAX_ERROR_LEN));
        record.crashed_at = Some(Utc::now());
        self.save(&accounts);
        warn!(account = %id, error = %error_msg, "session crashed");
    }

    /// Mark a crashed account as queued for restart, consuming one unit of
    /// its restart budget.
    pub fn mark_restarting(&self, id: &str) {
        let mut accounts = self.lock();
        if let Some(record) = accounts.get_mut(id) {
            record.status = AccountStatus::Restarting;
            record.restart_count += 1;
            let attempt = record.restart_count;
            self.save(&accounts);
            info!(account = %id, attempt, "restarting");
        }
    }

    /// Return a cancelled (not crashed) account to the pending state, e.g.
    /// when the work window closes mid-session.
    pub fn mark_pending(&self, id: &str) {
        let mut accounts = self.lock();
        if let Some(record) = accounts.get_mut(id) {
            record.status = AccountStatus::Pending;
            record.last_update = Some(Utc::now());
            self.save(&accounts);
        }
    }

    /// Wipe all records (operator reset).
    pub fn reset(&self) {
        let mut accounts = self.lock();
        accounts.clear();
        self.save(&accounts);
        info!("status ledger reset");
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn status_of(&self, id: &str) -> Option<AccountStatus> {
        self.lock().get(id).map(|r| r.status)
    }

    pub fn record(&self, id: &str) -> Option<AccountRecord> {
        self.lock().get(id).cloned()
    }

    pub fn restart_count(&self, id: &str) -> u32 {
        self.lock().get(id).map(|r| r.restart_count).unwrap_or(0)
    }

    /// Whether a crashed account still has restart budget left.
    pub fn should_restart(&self, id: &str, max_restarts: u32) -> bool {
        let accounts = self.lock();
        match accounts.get(id) {
            Some(record) => {
                if record.status != AccountStatus::Crashed {
                    return false;
                }
                if record.restart_count >= max_restarts {
                    warn!(account = %id, max_restarts, "restart budget exhausted");
                    return false;
                }
                true
            }
            None => false,
        }
    }

    /// Items completed so far in the current/last session.
    pub fn checkpoint(&self, id: &str) -> u32 {
        self.lock().get(id).map(|r| r.completed_tasks).unwrap_or(0)
    }

    /// Crashed/restarting accounts that still had session work left, with
    /// their records (for operator reporting).
    pub fn incomplete_accounts(&self) -> Vec<(String, AccountRecord)> {
        let accounts = self.lock();
        let mut out: Vec<(String, AccountRecord)> = accounts
            .iter()
            .filter(|(_, r)| {
                matches!(r.status, AccountStatus::Crashed | AccountStatus::Restarting)
                    && r.max_tasks > r.completed_tasks
            })
            .map(|(id, r)| (id.clone(), r.clone()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    pub fn all_records(&self) -> Vec<(String, AccountRecord)> {
        let accounts = self.lock();
        let mut out: Vec<(String, AccountRecord)> = accounts
            .iter()
            .map(|(id, r)| (id.clone(), r.clone()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}
