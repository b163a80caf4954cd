use crate::record::RecordSource;
use crate::types::Account;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::warn;

/// Per-account quota targets and the last-refreshed progress snapshot.
///
/// Progress is never guessed: it is recomputed from the completed-record
/// source on `refresh`, which the supervisor calls at every rotation boundary
/// and before starting a session. Reads between refreshes serve the snapshot.
pub struct ProgressStore {
    inner: Mutex<Snapshot>,
}

#[derive(Default)]
struct Snapshot {
    quotas: HashMap<String, u32>,
    progress: HashMap<String, u32>,
}

impl ProgressStore {
    pub fn new(accounts: &[Account]) -> Self {
        let quotas = accounts
            .iter()
            .map(|a| (a.id.clone(), a.quota))
            .collect::<HashMap<_, _>>();
        let progress = quotas.keys().map(|id| (id.clone(), 0)).collect();
        Self {
            inner: Mutex::new(Snapshot { quotas, progress }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Snapshot> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Recompute every account's progress from the record source. Accounts
    /// absent from the source read as 0. An unreadable source degrades to
    /// all-zero for this cycle rather than failing the scheduler.
    pub fn refresh(&self, source: &dyn RecordSource) {
        let counts = match source.counts_by_account() {
            Ok(counts) => counts,
            Err(e) => {
                warn!(error = %e, "record source unreadable, treating all progress as 0");
                HashMap::new()
            }
        };
        let mut snap = self.lock();
        let ids: Vec<String> = snap.quotas.keys().cloned().collect();
        for id in ids {
            let n = counts.get(&id).copied().unwrap_or(0);
            snap.progress.insert(id, n);
        }
    }

    pub fn quota(&self, id: &str) -> u32 {
        self.lock().quotas.get(id).copied().unwrap_or(0)
    }

    pub fn progress(&self, id: &str) -> u32 {
        self.lock().progress.get(id).copied().unwrap_or(0)
    }

    pub fn remaining(&self, id: &str) -> u32 {
        let snap = self.lock();
        let quota = snap.quotas.get(id).copied().unwrap_or(0);
        let progress = snap.progress.get(id).copied().unwrap_or(0);
        quota.saturating_sub(progress)
    }

    pub fn quota_met(&self, id: &str) -> bool {
        self.remaining(id) == 0
    }

    pub fn all_met(&self) -> bool {
        let snap = self.lock();
        snap.quotas.iter().all(|(id, quota)| {
            snap.progress.get(id).copied().unwrap_or(0) >= *quota
        })
    }

    /// Account ids still short of quota, in no particular order.
    pub fn unmet_accounts(&self) -> Vec<String> {
        let snap = self.lock();
        let mut ids: Vec<String> = snap
            .quotas
            .iter()
            .filter(|(id, quota)| snap.progress.get(*id).copied().unwrap_or(0) < **quota)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Sum of progress across all accounts (used for stall detection).
    pub fn total_progress(&self) -> u64 {
        self.lock().progress.values().map(|n| u64::from(*n)).sum()
    }
}
