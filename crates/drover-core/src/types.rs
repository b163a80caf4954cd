use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::Result;

// ---------------------------------------------------------------------------
// Account / Credential
// ---------------------------------------------------------------------------

/// An opaque secret. Wrapped so it never leaks through `Debug` output or
/// structured log fields.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Expose the raw secret for handoff to the actor login call.
    pub fn reveal(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// One unit of work capacity: an identity, its login secret, and the total
/// number of work items it must complete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub credential: Credential,
    pub quota: u32,
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// The outcome the decision source hands back for a work item. The scheduler
/// never inspects the contents beyond forwarding them to the actor and the
/// record log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Decision {
    Accept {
        #[serde(default)]
        notes: String,
    },
    Reject {
        #[serde(default)]
        notes: String,
        #[serde(default)]
        rejection_notes: String,
    },
    Revise {
        #[serde(default)]
        notes: String,
        #[serde(default)]
        revision_notes: String,
    },
    Unsure {
        #[serde(default)]
        notes: String,
    },
}

impl Decision {
    /// The status string the platform records when this decision is applied.
    pub fn applied_status(&self) -> &'static str {
        match self {
            Decision::Accept { .. } => "Accept",
            Decision::Reject { .. } => "Reject",
            Decision::Revise { .. } => "Needs Revision",
            Decision::Unsure { .. } => "Unsure",
        }
    }

    pub fn action_name(&self) -> &'static str {
        match self {
            Decision::Accept { .. } => "Accept",
            Decision::Reject { .. } => "Reject",
            Decision::Revise { .. } => "Revise",
            Decision::Unsure { .. } => "Unsure",
        }
    }

    pub fn notes(&self) -> &str {
        match self {
            Decision::Accept { notes }
            | Decision::Reject { notes, .. }
            | Decision::Revise { notes, .. }
            | Decision::Unsure { notes } => notes,
        }
    }
}

// ---------------------------------------------------------------------------
// Fetched items
// ---------------------------------------------------------------------------

/// What the actor found when asked for the next work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchedItem {
    /// A real item id to decide on.
    Item(String),
    /// The work surface rendered an item with no id attached. Handled with an
    /// automatic rejection, and still counts toward the session budget.
    Blank,
    /// The account has no more items available right now.
    Exhausted,
}

// ---------------------------------------------------------------------------
// Actor capability interface
// ---------------------------------------------------------------------------

/// The capability surface the scheduler requires from an actor session.
///
/// The actor itself (site navigation, field extraction) is an external
/// collaborator; the scheduler only ever drives it through these operations.
/// Implementations use interior mutability — the health monitor probes
/// `is_alive` concurrently with the owning worker task.
#[async_trait::async_trait]
pub trait WorkerActor: Send + Sync {
    async fn login(&self, account_id: &str, credential: &Credential) -> Result<()>;

    /// Navigate to the work area. Returns `false` if the first item presented
    /// is blank (no item id).
    async fn navigate_to_work_area(&self) -> Result<bool>;

    async fn fetch_next_item(&self) -> Result<FetchedItem>;

    /// Secondary identifier displayed alongside the item (platform UID).
    async fn fetch_secondary_id(&self) -> Result<String>;

    async fn apply_decision(&self, decision: &Decision) -> Result<()>;

    /// Liveness probe. Must never panic; any internal failure reads as dead.
    async fn is_alive(&self) -> bool;

    /// Best-effort teardown. Idempotent.
    async fn close(&self);
}

/// Creates a connected actor for an account. The browser launch (or whatever
/// the actor is) happens here; login is the worker's first act afterwards.
#[async_trait::async_trait]
pub trait ActorFactory: Send + Sync {
    async fn connect(&self, account: &Account) -> Result<Arc<dyn WorkerActor>>;
}
