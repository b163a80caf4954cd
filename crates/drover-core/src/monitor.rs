use crate::error::{DroverError, Result};
use crate::supervisor::SupervisorEvent;
use crate::types::WorkerActor;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Session bookkeeping
// ---------------------------------------------------------------------------

struct SessionEntry {
    actor: Arc<dyn WorkerActor>,
    started_at: DateTime<Utc>,
    last_check: DateTime<Utc>,
    healthy: bool,
    completed: u32,
}

/// Read-only session summary for status output.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub account: String,
    pub started_at: DateTime<Utc>,
    pub last_check: DateTime<Utc>,
    pub healthy: bool,
    pub completed: u32,
}

// ---------------------------------------------------------------------------
// HealthMonitor
// ---------------------------------------------------------------------------

/// Registry of live actor sessions with a periodic background health sweep.
///
/// Exactly one session may exist per account id; `register` rejects
/// duplicates. The sweep unregisters any session whose liveness probe fails
/// and emits a `Crashed` event, and reports a `SpawnNeeded` deficit whenever
/// healthy sessions fall below the capacity floor. The supervisor reacts to
/// those events; the sweep itself never spawns anything.
pub struct HealthMonitor {
    min_sessions: usize,
    check_interval: Duration,
    sessions: Mutex<HashMap<String, SessionEntry>>,
    events: mpsc::UnboundedSender<SupervisorEvent>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl HealthMonitor {
    pub fn new(
        min_sessions: usize,
        check_interval: Duration,
        events: mpsc::UnboundedSender<SupervisorEvent>,
    ) -> Self {
        Self {
            min_sessions,
            check_interval,
            sessions: Mutex::new(HashMap::new()),
            events,
            sweeper: Mutex::new(None),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, SessionEntry>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a live session. Fails if the account already has one — the
    /// single-session-per-account invariant is enforced here, at the source.
    pub fn register(&self, id: &str, actor: Arc<dyn WorkerActor>) -> Result<()> {
        let mut sessions = self.lock();
        if sessions.contains_key(id) {
            return Err(DroverError::DuplicateSession(id.to_string()));
        }
        let now = Utc::now();
        sessions.insert(
            id.to_string(),
            SessionEntry {
                actor,
                started_at: now,
                last_check: now,
                healthy: true,
                completed: 0,
            },
        );
        info!(account = %id, total = sessions.len(), "session registered");
        Ok(())
    }

    /// Remove a session, returning its actor handle for teardown. Idempotent:
    /// unregistering an absent id is a no-op.
    pub fn unregister(&self, id: &str) -> Option<Arc<dyn WorkerActor>> {
        let mut sessions = self.lock();
        let entry = sessions.remove(id);
        if entry.is_some() {
            info!(account = %id, remaining = sessions.len(), "session unregistered");
        }
        entry.map(|e| e.actor)
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    /// Track the running completed-count for status output.
    pub fn update_completed(&self, id: &str, completed: u32) {
        if let Some(entry) = self.lock().get_mut(id) {
            entry.completed = completed;
        }
    }

    /// Probe one session's liveness. Unknown ids and probe failures both read
    /// as unhealthy; the probe itself must not take the registry lock across
    /// the await.
    pub async fn health_check(&self, id: &str) -> bool {
        let actor = self.lock().get(id).map(|e| Arc::clone(&e.actor));
        let Some(actor) = actor else {
            return false;
        };
        let alive = actor.is_alive().await;
        if let Some(entry) = self.lock().get_mut(id) {
            entry.healthy = alive;
            entry.last_check = Utc::now();
        }
        if !alive {
            warn!(account = %id, "health check failed");
        }
        alive
    }

    /// Count of currently healthy sessions.
    pub fn active_count(&self) -> usize {
        self.lock().values().filter(|e| e.healthy).count()
    }

    pub fn active_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .lock()
            .iter()
            .filter(|(_, e)| e.healthy)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn sessions(&self) -> Vec<SessionInfo> {
        let sessions = self.lock();
        let mut out: Vec<SessionInfo> = sessions
            .iter()
            .map(|(id, e)| SessionInfo {
                account: id.clone(),
                started_at: e.started_at,
                last_check: e.last_check,
                healthy: e.healthy,
                completed: e.completed,
            })
            .collect();
        out.sort_by(|a, b| a.account.cmp(&b.account));
        out
    }

    /// One health pass over all registered sessions: unhealthy sessions are
    /// unregistered and reported, then any capacity deficit is reported.
    pub async fn sweep(&self) {
        let ids: Vec<String> = self.lock().keys().cloned().collect();
        for id in ids {
            if self.health_check(&id).await {
                continue;
            }
            if let Some(actor) = self.unregister(&id) {
                actor.close().await;
            }
            if self
                .events
                .send(SupervisorEvent::Crashed { account: id.clone() })
                .is_err()
            {
                debug!("supervisor gone, dropping crash event");
                return;
            }
        }

        let active = self.active_count();
        if active < self.min_sessions {
            let deficit = self.min_sessions - active;
            debug!(active, deficit, "below capacity floor");
            let _ = self.events.send(SupervisorEvent::SpawnNeeded { deficit });
        }
    }

    /// Start the periodic background sweep. Idempotent while running.
    pub fn start(self: &Arc<Self>) {
        let mut sweeper = self.sweeper.lock().unwrap_or_else(|e| e.into_inner());
        if sweeper.is_some() {
            return;
        }
        let monitor = Arc::clone(self);
        let interval = self.check_interval;
        info!(interval_secs = interval.as_secs(), min = self.min_sessions, "health monitor started");
        *sweeper = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; skip it so sessions get a
            // full interval to come up before the first sweep.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                monitor.sweep().await;
            }
        }));
    }

    /// Stop the background sweep. Registered sessions are left untouched.
    pub fn stop(&self) {
        let mut sweeper = self.sweeper.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = sweeper.take() {
            handle.abort();
            info!("health monitor stopped");
        }
    }
}
