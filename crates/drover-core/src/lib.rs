//! `drover-core` — supervision and rotation scheduling for a pool of worker
//! accounts, each driving an external browser actor through a quota of work
//! items.
//!
//! The scheduler keeps a capacity floor of live actor sessions, health-checks
//! them in the background, restarts crashed accounts with a bounded budget
//! (crashed accounts preempt everyone else), gates all spawning on a daily
//! work window, and rotates accounts until every quota is met.
//!
//! ```text
//! Config
//!   │
//!   ▼
//! Supervisor ── owns ──► StatusLedger / ProgressStore / DispatchQueue /
//!   │                    HealthMonitor / TimeWindowGate
//!   │ spawns
//!   ▼
//! session task ── drives ──► WorkerActor (external, via ActorFactory)
//!                 consults ─► DecisionSource
//!                 appends ──► RecordSink (read back by ProgressStore)
//! ```

pub mod config;
pub mod decision;
pub mod error;
pub mod io;
pub mod ledger;
pub mod monitor;
pub mod progress;
pub mod queue;
pub mod record;
pub mod supervisor;
pub mod types;
pub mod window;
pub mod worker;

pub use error::{DroverError, Result};
pub use supervisor::{Collaborators, FinalReport, Supervisor, SupervisorEvent};
pub use types::{Account, ActorFactory, Credential, Decision, FetchedItem, WorkerActor};
