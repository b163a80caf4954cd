//! End-to-end supervisor runs against scripted in-memory actors: rotation,
//! crash recovery with incomplete-first dispatch, restart-budget exhaustion,
//! and clean stop conditions.

use drover_core::config::{ActorCommand, Config, PacingConfig, WorkWindow};
use drover_core::decision::DecisionSource;
use drover_core::ledger::AccountStatus;
use drover_core::record::{CompletedRecord, RecordSink, RecordSource};
use drover_core::supervisor::Collaborators;
use drover_core::types::{
    Account, ActorFactory, Credential, Decision, FetchedItem, WorkerActor,
};
use drover_core::{DroverError, Supervisor};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

/// Shared record store standing in for the completed-record file.
struct MemoryRecords {
    records: Mutex<Vec<CompletedRecord>>,
}

impl MemoryRecords {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            records: Mutex::new(Vec::new()),
        })
    }

    fn count_for(&self, account: &str) -> u32 {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.account == account)
            .count() as u32
    }
}

impl RecordSink for MemoryRecords {
    fn append(&self, record: &CompletedRecord) -> drover_core::Result<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

impl RecordSource for MemoryRecords {
    fn counts_by_account(&self) -> drover_core::Result<HashMap<String, u32>> {
        let mut counts = HashMap::new();
        for r in self.records.lock().unwrap().iter() {
            *counts.entry(r.account.clone()).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

struct AcceptEverything;

impl DecisionSource for AcceptEverything {
    fn decide(&self, _: &str) -> drover_core::Result<Decision> {
        Ok(Decision::Accept { notes: "ok".into() })
    }
}

/// A well-behaved actor with an endless supply of items.
struct SteadyActor {
    account: String,
    serial: AtomicU32,
}

#[async_trait::async_trait]
impl WorkerActor for SteadyActor {
    async fn login(&self, _: &str, _: &Credential) -> drover_core::Result<()> {
        Ok(())
    }
    async fn navigate_to_work_area(&self) -> drover_core::Result<bool> {
        Ok(true)
    }
    async fn fetch_next_item(&self) -> drover_core::Result<FetchedItem> {
        let n = self.serial.fetch_add(1, Ordering::SeqCst);
        Ok(FetchedItem::Item(format!("{}-item-{n}", self.account)))
    }
    async fn fetch_secondary_id(&self) -> drover_core::Result<String> {
        Ok("uid".into())
    }
    async fn apply_decision(&self, _: &Decision) -> drover_core::Result<()> {
        Ok(())
    }
    async fn is_alive(&self) -> bool {
        true
    }
    async fn close(&self) {}
}

/// An actor that faults partway through its first session, then behaves.
struct FlakyOnceActor {
    account: String,
    serial: AtomicU32,
    /// Faults on the Nth item of the first connect, healthy afterwards.
    fault_at: u32,
    connect_number: u32,
}

#[async_trait::async_trait]
impl WorkerActor for FlakyOnceActor {
    async fn login(&self, _: &str, _: &Credential) -> drover_core::Result<()> {
        Ok(())
    }
    async fn navigate_to_work_area(&self) -> drover_core::Result<bool> {
        Ok(true)
    }
    async fn fetch_next_item(&self) -> drover_core::Result<FetchedItem> {
        let n = self.serial.fetch_add(1, Ordering::SeqCst);
        if self.connect_number == 1 && n + 1 == self.fault_at {
            return Err(DroverError::ActorFault("browser disconnected".into()));
        }
        Ok(FetchedItem::Item(format!("{}-item-{n}", self.account)))
    }
    async fn fetch_secondary_id(&self) -> drover_core::Result<String> {
        Ok("uid".into())
    }
    async fn apply_decision(&self, _: &Decision) -> drover_core::Result<()> {
        Ok(())
    }
    async fn is_alive(&self) -> bool {
        true
    }
    async fn close(&self) {}
}

enum Behavior {
    Steady,
    /// Fault on the given item of the first session.
    FlakyOnce(u32),
    /// Every connect produces an actor whose login is rejected.
    LoginAlwaysFails,
}

struct BrokenLoginActor;

#[async_trait::async_trait]
impl WorkerActor for BrokenLoginActor {
    async fn login(&self, _: &str, _: &Credential) -> drover_core::Result<()> {
        Err(DroverError::ActorFault("login rejected".into()))
    }
    async fn navigate_to_work_area(&self) -> drover_core::Result<bool> {
        Ok(true)
    }
    async fn fetch_next_item(&self) -> drover_core::Result<FetchedItem> {
        Ok(FetchedItem::Exhausted)
    }
    async fn fetch_secondary_id(&self) -> drover_core::Result<String> {
        Ok(String::new())
    }
    async fn apply_decision(&self, _: &Decision) -> drover_core::Result<()> {
        Ok(())
    }
    async fn is_alive(&self) -> bool {
        false
    }
    async fn close(&self) {}
}

/// Factory producing scripted actors per account, counting connects.
struct ScriptedFactory {
    behaviors: HashMap<String, Behavior>,
    connects: Mutex<HashMap<String, u32>>,
    /// Order in which accounts were connected (dispatch order probe).
    connect_order: Mutex<Vec<String>>,
}

impl ScriptedFactory {
    fn new(behaviors: HashMap<String, Behavior>) -> Arc<Self> {
        Arc::new(Self {
            behaviors,
            connects: Mutex::new(HashMap::new()),
            connect_order: Mutex::new(Vec::new()),
        })
    }

    fn connects_for(&self, account: &str) -> u32 {
        self.connects
            .lock()
            .unwrap()
            .get(account)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl ActorFactory for ScriptedFactory {
    async fn connect(&self, account: &Account) -> drover_core::Result<Arc<dyn WorkerActor>> {
        let n = {
            let mut connects = self.connects.lock().unwrap();
            let n = connects.entry(account.id.clone()).or_insert(0);
            *n += 1;
            *n
        };
        self.connect_order.lock().unwrap().push(account.id.clone());

        let actor: Arc<dyn WorkerActor> = match self.behaviors.get(&account.id) {
            Some(Behavior::FlakyOnce(fault_at)) => Arc::new(FlakyOnceActor {
                account: account.id.clone(),
                serial: AtomicU32::new(0),
                fault_at: *fault_at,
                connect_number: n,
            }),
            Some(Behavior::LoginAlwaysFails) => Arc::new(BrokenLoginActor),
            _ => Arc::new(SteadyActor {
                account: account.id.clone(),
                serial: AtomicU32::new(0),
            }),
        };
        Ok(actor)
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

fn account(id: &str, quota: u32) -> Account {
    Account {
        id: id.into(),
        credential: Credential::new("pw"),
        quota,
    }
}

fn config(dir: &TempDir, accounts: Vec<Account>) -> Config {
    Config {
        min_sessions: 1,
        check_interval_secs: 10,
        max_restarts: 3,
        tasks_per_rotation: 100,
        work_window: WorkWindow::default(), // disabled: always permitted
        pacing: PacingConfig::none(),
        actor_command: ActorCommand::default(),
        ledger_path: dir.path().join("ledger.yaml"),
        records_path: dir.path().join("records.jsonl"),
        decision_table: None,
        accounts,
    }
}

fn supervisor(
    config: Config,
    factory: Arc<ScriptedFactory>,
    records: Arc<MemoryRecords>,
) -> Supervisor {
    Supervisor::new(
        config,
        Collaborators {
            factory,
            decisions: Arc::new(AcceptEverything),
            records: records.clone(),
            record_source: records,
        },
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn two_accounts_meet_quota_and_stop() {
    let dir = TempDir::new().unwrap();
    let records = MemoryRecords::new();
    let factory = ScriptedFactory::new(HashMap::new());
    let config = config(&dir, vec![account("g007", 3), account("g008", 2)]);

    let report = supervisor(config, factory.clone(), records.clone())
        .run()
        .await
        .unwrap();

    assert!(report.all_met());
    assert!(report.unresolved().is_empty());
    assert_eq!(records.count_for("g007"), 3);
    assert_eq!(records.count_for("g008"), 2);
    // min_sessions = 1: each account got exactly one full session.
    assert_eq!(factory.connects_for("g007"), 1);
    assert_eq!(factory.connects_for("g008"), 1);
}

#[tokio::test(start_paused = true)]
async fn session_cap_forces_multiple_rotations() {
    let dir = TempDir::new().unwrap();
    let records = MemoryRecords::new();
    let factory = ScriptedFactory::new(HashMap::new());
    let mut config = config(&dir, vec![account("g007", 5)]);
    config.tasks_per_rotation = 2; // 5 items → 3 sessions

    let report = supervisor(config, factory.clone(), records.clone())
        .run()
        .await
        .unwrap();

    assert!(report.all_met());
    assert_eq!(records.count_for("g007"), 5);
    assert_eq!(factory.connects_for("g007"), 3);
}

#[tokio::test(start_paused = true)]
async fn crashed_account_recovers_and_preempts_normal_work() {
    let dir = TempDir::new().unwrap();
    let records = MemoryRecords::new();
    let mut behaviors = HashMap::new();
    // g007 crashes after completing 1 of its 3 items.
    behaviors.insert("g007".to_string(), Behavior::FlakyOnce(2));
    let factory = ScriptedFactory::new(behaviors);
    let config = config(&dir, vec![account("g007", 3), account("g008", 2)]);

    let sup = supervisor(config, factory.clone(), records.clone());
    let ledger = sup.ledger();
    let report = sup.run().await.unwrap();

    assert!(report.all_met());
    assert_eq!(records.count_for("g007"), 3);
    assert_eq!(records.count_for("g008"), 2);
    // One crash, one restart consumed.
    assert_eq!(factory.connects_for("g007"), 2);
    assert_eq!(ledger.restart_count("g007"), 1);

    // The restarted g007 session must have been dispatched before any
    // other account's next session: its reconnect directly follows the
    // session that was live when it crashed.
    let order = factory.connect_order.lock().unwrap().clone();
    let first_g007 = order.iter().position(|id| id == "g007").unwrap();
    let second_g007 = order[first_g007 + 1..]
        .iter()
        .position(|id| id == "g007")
        .map(|i| i + first_g007 + 1)
        .unwrap();
    // With min_sessions = 1 there is at most one session between crash and
    // restart (the one already running); no fresh normal dispatch may cut
    // in line.
    assert!(second_g007 <= first_g007 + 2, "restart was not prioritized: {order:?}");
}

#[tokio::test(start_paused = true)]
async fn restart_budget_exhaustion_is_reported_unresolved() {
    let dir = TempDir::new().unwrap();
    let records = MemoryRecords::new();
    let mut behaviors = HashMap::new();
    behaviors.insert("g007".to_string(), Behavior::LoginAlwaysFails);
    let factory = ScriptedFactory::new(behaviors);
    let mut config = config(&dir, vec![account("g007", 3), account("g008", 1)]);
    config.max_restarts = 2;

    let sup = supervisor(config, factory.clone(), records.clone());
    let ledger = sup.ledger();
    let report = sup.run().await.unwrap();

    // The healthy account finished; the broken one is surfaced, not silently
    // dropped.
    assert!(!report.all_met());
    assert_eq!(records.count_for("g008"), 1);
    assert_eq!(records.count_for("g007"), 0);

    let unresolved = report.unresolved();
    assert_eq!(unresolved.len(), 1);
    assert_eq!(unresolved[0].id, "g007");
    assert_eq!(unresolved[0].restart_count, 2);
    assert_eq!(ledger.status_of("g007"), Some(AccountStatus::Crashed));
    // Initial attempt + the two budgeted restarts.
    assert_eq!(factory.connects_for("g007"), 3);
}

#[tokio::test(start_paused = true)]
async fn quota_met_account_is_never_dispatched() {
    let dir = TempDir::new().unwrap();
    let records = MemoryRecords::new();
    // g008 already has its quota on record before the run starts.
    records
        .append(&CompletedRecord::new(
            "g008", "old-1", "uid", "Accept", "Accept", "",
        ))
        .unwrap();
    records
        .append(&CompletedRecord::new(
            "g008", "old-2", "uid", "Accept", "Accept", "",
        ))
        .unwrap();

    let factory = ScriptedFactory::new(HashMap::new());
    let config = config(&dir, vec![account("g007", 1), account("g008", 2)]);

    let report = supervisor(config, factory.clone(), records.clone())
        .run()
        .await
        .unwrap();

    assert!(report.all_met());
    assert_eq!(factory.connects_for("g008"), 0);
    assert_eq!(factory.connects_for("g007"), 1);
}

#[tokio::test(start_paused = true)]
async fn accounts_alternate_under_single_session_floor() {
    let dir = TempDir::new().unwrap();
    let records = MemoryRecords::new();
    let factory = ScriptedFactory::new(HashMap::new());
    let mut config = config(&dir, vec![account("g007", 2), account("g008", 2)]);
    config.tasks_per_rotation = 1; // one item per session

    let report = supervisor(config, factory.clone(), records.clone())
        .run()
        .await
        .unwrap();

    assert!(report.all_met());
    // Four single-item sessions, alternating — no account is starved while
    // the other runs twice in a row within a rotation.
    let order = factory.connect_order.lock().unwrap().clone();
    assert_eq!(order.len(), 4);
    assert_eq!(order[0], order[2]);
    assert_eq!(order[1], order[3]);
    assert_ne!(order[0], order[1]);
}
