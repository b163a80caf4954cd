use crate::config::Config;
use crate::decision::DecisionSource;
use crate::error::Result;
use crate::ledger::{AccountStatus, StatusLedger};
use crate::monitor::HealthMonitor;
use crate::progress::ProgressStore;
use crate::queue::{DispatchQueue, QueueTier};
use crate::record::{RecordSink, RecordSource};
use crate::types::{Account, ActorFactory};
use crate::window::TimeWindowGate;
use crate::worker::{run_session, SessionContext, SessionEnd, SessionOutcome};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Supervisor tick interval. Capacity shortfalls are event-driven; this tick
/// is the safety net and drives window/rotation checks.
const TICK_INTERVAL: Duration = Duration::from_secs(5);
/// Delay between back-to-back spawns so actors don't all slam the site at
/// the same instant.
const SPAWN_STAGGER: Duration = Duration::from_secs(2);
/// Status summary cadence, in ticks.
const STATUS_EVERY_TICKS: u32 = 6;
/// Consecutive zero-progress rotations tolerated before declaring a stall.
const STALL_ROTATION_LIMIT: u32 = 2;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Signals the supervisor reacts to between ticks.
#[derive(Debug)]
pub enum SupervisorEvent {
    /// The health monitor found a dead session and unregistered it.
    Crashed { account: String },
    /// Healthy sessions dropped below the capacity floor.
    SpawnNeeded { deficit: usize },
    /// A worker session ran to its natural end (including caught faults).
    SessionEnded {
        account: String,
        outcome: SessionOutcome,
    },
}

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Initializing,
    Active,
    /// Outside the work window: all sessions cancelled, waiting to reopen.
    Paused,
    /// Crashed accounts must finish before any new rotation is admitted.
    Draining,
    Stopped,
}

// ---------------------------------------------------------------------------
// External collaborators
// ---------------------------------------------------------------------------

/// The interfaces the scheduler drives but does not implement.
pub struct Collaborators {
    pub factory: Arc<dyn ActorFactory>,
    pub decisions: Arc<dyn DecisionSource>,
    pub records: Arc<dyn RecordSink>,
    pub record_source: Arc<dyn RecordSource>,
}

// ---------------------------------------------------------------------------
// Final report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, serde::Serialize)]
pub struct AccountReport {
    pub id: String,
    pub quota: u32,
    pub progress: u32,
    pub status: Option<AccountStatus>,
    pub restart_count: u32,
    /// Restart budget spent with quota still unmet.
    pub unresolved: bool,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct FinalReport {
    pub rotations: u32,
    pub degraded_durability: bool,
    pub accounts: Vec<AccountReport>,
}

impl FinalReport {
    pub fn all_met(&self) -> bool {
        self.accounts.iter().all(|a| a.progress >= a.quota)
    }

    pub fn unresolved(&self) -> Vec<&AccountReport> {
        self.accounts.iter().filter(|a| a.unresolved).collect()
    }
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

/// The control loop that owns the scheduling services and decides, at every
/// instant, which accounts have an active session, which crashed accounts are
/// retried first, and when the whole run is done.
///
/// All services are constructed here and passed explicitly — no globals; the
/// monitor's background sweep starts in `run` and stops on shutdown.
pub struct Supervisor {
    config: Config,
    accounts: HashMap<String, Account>,

    ledger: Arc<StatusLedger>,
    progress: Arc<ProgressStore>,
    queue: Arc<DispatchQueue>,
    monitor: Arc<HealthMonitor>,
    gate: TimeWindowGate,

    factory: Arc<dyn ActorFactory>,
    decisions: Arc<dyn DecisionSource>,
    records: Arc<dyn RecordSink>,
    record_source: Arc<dyn RecordSource>,

    events_tx: mpsc::UnboundedSender<SupervisorEvent>,
    events_rx: mpsc::UnboundedReceiver<SupervisorEvent>,

    running: HashMap<String, JoinHandle<()>>,
    /// Accounts whose restart budget is spent with quota unmet.
    exhausted: HashSet<String>,
    state: RunState,
    rotation: u32,
    ticks: u32,
    stall_rotations: u32,
    last_total_progress: u64,
}

impl Supervisor {
    pub fn new(config: Config, collaborators: Collaborators) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let accounts: HashMap<String, Account> = config
            .accounts
            .iter()
            .map(|a| (a.id.clone(), a.clone()))
            .collect();
        let ledger = Arc::new(StatusLedger::open(&config.ledger_path));
        let progress = Arc::new(ProgressStore::new(&config.accounts));
        let monitor = Arc::new(HealthMonitor::new(
            config.min_sessions,
            Duration::from_secs(config.check_interval_secs),
            events_tx.clone(),
        ));
        let gate = TimeWindowGate::new(config.work_window);

        Self {
            accounts,
            ledger,
            progress,
            queue: Arc::new(DispatchQueue::new()),
            monitor,
            gate,
            factory: collaborators.factory,
            decisions: collaborators.decisions,
            records: collaborators.records,
            record_source: collaborators.record_source,
            events_tx,
            events_rx,
            running: HashMap::new(),
            exhausted: HashSet::new(),
            state: RunState::Initializing,
            rotation: 1,
            ticks: 0,
            stall_rotations: 0,
            last_total_progress: 0,
            config,
        }
    }

    pub fn ledger(&self) -> Arc<StatusLedger> {
        Arc::clone(&self.ledger)
    }

    pub fn progress(&self) -> Arc<ProgressStore> {
        Arc::clone(&self.progress)
    }

    /// Run to completion: every quota met, or nothing left that can make
    /// progress. Consumes the supervisor; the report is the result.
    pub async fn run(mut self) -> Result<FinalReport> {
        self.initialize().await;

        // Take the receiver out so the select below doesn't hold a borrow of
        // `self` across the handler calls.
        let (_unused_tx, unused_rx) = mpsc::unbounded_channel();
        let mut events_rx = std::mem::replace(&mut self.events_rx, unused_rx);

        let mut tick = tokio::time::interval(TICK_INTERVAL);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        while self.state != RunState::Stopped {
            tokio::select! {
                _ = tick.tick() => self.on_tick().await,
                Some(event) = events_rx.recv() => self.on_event(event).await,
            }
        }

        self.shutdown().await;
        Ok(self.final_report())
    }

    // -----------------------------------------------------------------------
    // Initializing
    // -----------------------------------------------------------------------

    async fn initialize(&mut self) {
        self.progress.refresh(self.record_source.as_ref());
        info!(
            accounts = self.accounts.len(),
            min_sessions = self.config.min_sessions,
            max_restarts = self.config.max_restarts,
            tasks_per_rotation = self.config.tasks_per_rotation,
            "initializing"
        );
        info!("{}", self.gate.status_message(chrono::Local::now().naive_local()));

        let mut ids: Vec<&String> = self.accounts.keys().collect();
        ids.sort();
        for id in ids {
            if self.progress.quota_met(id) {
                info!(
                    account = %id,
                    progress = self.progress.progress(id),
                    quota = self.progress.quota(id),
                    "quota already met, skipping"
                );
            } else {
                self.queue.push_normal(id.clone());
            }
        }

        self.monitor.start();
        self.state = RunState::Active;

        // Stagger the initial spawns.
        for _ in 0..self.config.min_sessions {
            if !self.spawn_next(false) {
                break;
            }
            tokio::time::sleep(SPAWN_STAGGER).await;
        }
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    async fn on_tick(&mut self) {
        self.ticks += 1;
        match self.state {
            RunState::Active => {
                if !self.gate.is_within_now() {
                    self.enter_pause().await;
                    return;
                }
                self.top_up(false);
                self.maybe_rotate();
            }
            RunState::Draining => {
                if !self.gate.is_within_now() {
                    self.enter_pause().await;
                    return;
                }
                self.top_up(true);
                if self.queue.incomplete_len() == 0 && self.running.is_empty() {
                    info!("incomplete accounts drained, resuming rotation");
                    self.state = RunState::Active;
                    self.maybe_rotate();
                }
            }
            RunState::Paused => {
                if self.gate.is_within_now() {
                    info!("work window reopened, resuming");
                    self.state = RunState::Active;
                    self.top_up(false);
                }
            }
            RunState::Initializing | RunState::Stopped => {}
        }

        if self.ticks % STATUS_EVERY_TICKS == 0 && self.state != RunState::Paused {
            info!(
                active = self.monitor.active_count(),
                running = self.running.len(),
                incomplete = self.queue.incomplete_len(),
                normal = self.queue.normal_len(),
                rotation = self.rotation,
                "status"
            );
        }
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    async fn on_event(&mut self, event: SupervisorEvent) {
        match event {
            SupervisorEvent::Crashed { account } => {
                if let Some(handle) = self.running.remove(&account) {
                    handle.abort();
                }
                self.handle_failure(&account, "health check failed: actor lost")
                    .await;
            }
            SupervisorEvent::SpawnNeeded { deficit } => {
                debug!(deficit, "spawn requested by monitor");
                match self.state {
                    RunState::Active => self.top_up(false),
                    RunState::Draining => self.top_up(true),
                    _ => {}
                }
            }
            SupervisorEvent::SessionEnded { account, outcome } => {
                self.running.remove(&account);
                self.apply_outcome(&account, outcome).await;
                match self.state {
                    RunState::Active => self.top_up(false),
                    RunState::Draining => {
                        self.top_up(true);
                        if self.queue.incomplete_len() == 0 && self.running.is_empty() {
                            info!("incomplete accounts drained, resuming rotation");
                            self.state = RunState::Active;
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    async fn apply_outcome(&mut self, id: &str, outcome: SessionOutcome) {
        match outcome.end {
            SessionEnd::BudgetMet => {
                self.progress.refresh(self.record_source.as_ref());
                self.ledger.mark_completed(id, outcome.completed);
                if self.progress.quota_met(id) {
                    info!(
                        account = %id,
                        progress = self.progress.progress(id),
                        quota = self.progress.quota(id),
                        "quota met"
                    );
                } else {
                    info!(
                        account = %id,
                        remaining = self.progress.remaining(id),
                        "session budget met, re-queuing for next session"
                    );
                    self.queue.push_normal(id.to_string());
                }
            }
            SessionEnd::ItemsExhausted => {
                self.progress.refresh(self.record_source.as_ref());
                if self.progress.quota_met(id) {
                    self.ledger.mark_completed(id, outcome.completed);
                    info!(account = %id, "quota met");
                } else {
                    // No items left for this account right now; it gets
                    // another chance when the next rotation refills.
                    self.ledger.mark_pending(id);
                    info!(
                        account = %id,
                        completed = outcome.completed,
                        remaining = self.progress.remaining(id),
                        "work source exhausted, waiting for next rotation"
                    );
                }
            }
            SessionEnd::Unhealthy => {
                self.handle_failure(id, "actor became unhealthy mid-session")
                    .await;
            }
            SessionEnd::Fault(message) => {
                self.handle_failure(id, &message).await;
            }
        }
    }

    /// Crash reaction. A crash can be reported twice (monitor sweep and the
    /// session's own ending); the queue/exhausted guards make the second
    /// report a no-op.
    async fn handle_failure(&mut self, id: &str, error_msg: &str) {
        if self.exhausted.contains(id) || self.queue.contains(id) {
            debug!(account = %id, "duplicate crash report, ignoring");
            return;
        }
        if let Some(actor) = self.monitor.unregister(id) {
            actor.close().await;
        }
        self.ledger.mark_crashed(id, error_msg);
        self.progress.refresh(self.record_source.as_ref());

        let remaining = self.progress.remaining(id);
        if remaining == 0 {
            self.ledger.mark_completed(id, self.ledger.checkpoint(id));
            info!(account = %id, "completed its quota before crashing");
            return;
        }

        if self.ledger.should_restart(id, self.config.max_restarts) {
            self.ledger.mark_restarting(id);
            self.queue.push_incomplete(id.to_string());
            warn!(
                account = %id,
                remaining,
                restarts = self.ledger.restart_count(id),
                max_restarts = self.config.max_restarts,
                "crashed mid-quota, queued for priority restart"
            );
        } else {
            self.exhausted.insert(id.to_string());
            error!(
                account = %id,
                remaining,
                restarts = self.ledger.restart_count(id),
                "restart budget exhausted with quota unmet — account unresolved"
            );
        }
    }

    // -----------------------------------------------------------------------
    // Spawning
    // -----------------------------------------------------------------------

    fn top_up(&mut self, incomplete_only: bool) {
        while self.running.len() < self.config.min_sessions {
            if !self.spawn_next(incomplete_only) {
                break;
            }
        }
    }

    /// Dispatch the next queued account into a session task. Returns false
    /// when nothing could be spawned (window closed, queues empty, or every
    /// queued account is already running).
    fn spawn_next(&mut self, incomplete_only: bool) -> bool {
        if !self.gate.is_within_now() {
            debug!("spawn refused: outside work window");
            return false;
        }

        let mut tried: HashSet<String> = HashSet::new();
        loop {
            let popped = if incomplete_only {
                self.queue.pop_incomplete().map(|id| (id, QueueTier::Incomplete))
            } else {
                self.queue.pop_next()
            };
            let Some((id, tier)) = popped else {
                return false;
            };

            // Single-session-per-account: a popped id with a live session is
            // re-queued and the next id tried. Seeing it twice means the
            // queue holds only running accounts — give up this attempt.
            if self.running.contains_key(&id) || self.monitor.is_registered(&id) {
                warn!(account = %id, "already has a live session, re-queuing");
                let seen_before = !tried.insert(id.clone());
                match tier {
                    QueueTier::Incomplete => self.queue.requeue_incomplete(id),
                    QueueTier::Normal => self.queue.push_normal(id),
                }
                if seen_before {
                    return false;
                }
                continue;
            }

            let Some(account) = self.accounts.get(&id).cloned() else {
                warn!(account = %id, "unknown account id in queue, dropping");
                continue;
            };
            if account.credential.reveal().is_empty() {
                error!(account = %id, "no credential on file, skipping account");
                continue;
            }

            self.progress.refresh(self.record_source.as_ref());
            let remaining = self.progress.remaining(&id);
            if remaining == 0 {
                info!(account = %id, "quota met while queued, skipping");
                continue;
            }
            let budget = remaining.min(self.config.tasks_per_rotation);

            let checkpoint = self.ledger.checkpoint(&id);
            info!(
                account = %id,
                tier = ?tier,
                budget,
                checkpoint,
                rotation = self.rotation,
                "spawning session"
            );

            let ctx = SessionContext {
                account,
                budget,
                rotation: self.rotation,
                ledger: Arc::clone(&self.ledger),
                monitor: Arc::clone(&self.monitor),
                decisions: Arc::clone(&self.decisions),
                records: Arc::clone(&self.records),
                pacing: self.config.pacing,
            };
            let factory = Arc::clone(&self.factory);
            let monitor = Arc::clone(&self.monitor);
            let events = self.events_tx.clone();
            let handle = tokio::spawn(session_task(factory, monitor, ctx, events));
            self.running.insert(id, handle);
            return true;
        }
    }

    // -----------------------------------------------------------------------
    // Rotation
    // -----------------------------------------------------------------------

    fn maybe_rotate(&mut self) {
        if !self.running.is_empty() || self.queue.normal_len() > 0 {
            return;
        }
        if self.queue.incomplete_len() > 0 {
            // Rotation is blocked until every incomplete account has finished.
            info!(
                incomplete = self.queue.incomplete_len(),
                "rotation blocked by incomplete accounts, draining them first"
            );
            for (id, record) in self.ledger.incomplete_accounts() {
                info!(
                    account = %id,
                    completed = record.completed_tasks,
                    max_tasks = record.max_tasks,
                    restarts = record.restart_count,
                    "incomplete"
                );
            }
            self.state = RunState::Draining;
            return;
        }

        // Rotation boundary.
        self.progress.refresh(self.record_source.as_ref());

        if self.progress.all_met() {
            info!(rotation = self.rotation, "all quotas met, stopping");
            self.state = RunState::Stopped;
            return;
        }

        let pending: Vec<String> = self
            .progress
            .unmet_accounts()
            .into_iter()
            .filter(|id| !self.exhausted.contains(id))
            .collect();
        if pending.is_empty() {
            error!(
                unresolved = self.exhausted.len(),
                "no account can make further progress, stopping"
            );
            self.state = RunState::Stopped;
            return;
        }

        let total = self.progress.total_progress();
        if total == self.last_total_progress {
            self.stall_rotations += 1;
            if self.stall_rotations >= STALL_ROTATION_LIMIT {
                error!(
                    rotations = self.stall_rotations,
                    "zero completions across consecutive rotations, stopping"
                );
                self.state = RunState::Stopped;
                return;
            }
        } else {
            self.stall_rotations = 0;
            self.last_total_progress = total;
        }

        self.rotation += 1;
        info!(
            rotation = self.rotation,
            accounts = pending.len(),
            "starting rotation"
        );
        for id in pending {
            self.queue.push_normal(id);
        }
        self.top_up(false);
    }

    // -----------------------------------------------------------------------
    // Window pause
    // -----------------------------------------------------------------------

    async fn enter_pause(&mut self) {
        let now = chrono::Local::now().naive_local();
        warn!("{}", self.gate.status_message(now));

        let cancelled: Vec<(String, JoinHandle<()>)> = self.running.drain().collect();
        for (id, handle) in cancelled {
            info!(account = %id, "pausing session for work window");
            handle.abort();
            if let Some(actor) = self.monitor.unregister(&id) {
                actor.close().await;
            }
            self.ledger.mark_pending(&id);
            // A window close is not a crash: cancelled work re-queues to the
            // normal tier.
            self.queue.push_normal(id);
        }

        if let Some(secs) = self.gate.seconds_until_start(now) {
            info!(
                hours = format!("{:.1}", secs as f64 / 3600.0),
                "sleeping until the work window reopens"
            );
        }
        self.state = RunState::Paused;
    }

    // -----------------------------------------------------------------------
    // Shutdown / report
    // -----------------------------------------------------------------------

    async fn shutdown(&mut self) {
        self.monitor.stop();
        let leftover: Vec<(String, JoinHandle<()>)> = self.running.drain().collect();
        for (id, handle) in leftover {
            handle.abort();
            if let Some(actor) = self.monitor.unregister(&id) {
                actor.close().await;
            }
        }
        if self.ledger.degraded() {
            error!("ledger ran in degraded-durability mode: status writes were lost");
        }
    }

    fn final_report(&self) -> FinalReport {
        let mut ids: Vec<&String> = self.accounts.keys().collect();
        ids.sort();
        let accounts = ids
            .into_iter()
            .map(|id| AccountReport {
                id: id.clone(),
                quota: self.progress.quota(id),
                progress: self.progress.progress(id),
                status: self.ledger.status_of(id),
                restart_count: self.ledger.restart_count(id),
                unresolved: self.exhausted.contains(id),
            })
            .collect();
        FinalReport {
            rotations: self.rotation,
            degraded_durability: self.ledger.degraded(),
            accounts,
        }
    }
}

// ---------------------------------------------------------------------------
// Session task wrapper
// ---------------------------------------------------------------------------

/// One spawned task per session: connect the actor, register it, drive the
/// session, tear down, report. Every failure funnels into the outcome — the
/// task itself never propagates an error.
async fn session_task(
    factory: Arc<dyn ActorFactory>,
    monitor: Arc<HealthMonitor>,
    ctx: SessionContext,
    events: mpsc::UnboundedSender<SupervisorEvent>,
) {
    let id = ctx.account.id.clone();
    let outcome = match factory.connect(&ctx.account).await {
        Err(e) => SessionOutcome {
            completed: 0,
            end: SessionEnd::Fault(format!("actor connect failed: {e}")),
        },
        Ok(actor) => match monitor.register(&id, Arc::clone(&actor)) {
            Err(e) => {
                actor.close().await;
                SessionOutcome {
                    completed: 0,
                    end: SessionEnd::Fault(e.to_string()),
                }
            }
            Ok(()) => {
                let outcome = run_session(Arc::clone(&actor), ctx).await;
                if let Some(actor) = monitor.unregister(&id) {
                    actor.close().await;
                }
                outcome
            }
        },
    };
    let _ = events.send(SupervisorEvent::SessionEnded {
        account: id,
        outcome,
    });
}
