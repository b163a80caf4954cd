use crate::config::PacingConfig;
use crate::decision::DecisionSource;
use crate::error::Result;
use crate::ledger::StatusLedger;
use crate::monitor::HealthMonitor;
use crate::record::{CompletedRecord, RecordSink};
use crate::types::{Account, Decision, FetchedItem, WorkerActor};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Synthetic item id recorded for items presented without an id.
pub const BLANK_ITEM_ID: &str = "BLANK_TASK";
const BLANK_ITEM_NOTE: &str = "No Task ID Present.";

// ---------------------------------------------------------------------------
// Session outcome
// ---------------------------------------------------------------------------

/// How a session ended. The supervisor's queue decision hangs off this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// Hit the session budget cleanly.
    BudgetMet,
    /// The account ran out of available work items — not an error.
    ItemsExhausted,
    /// The health gate tripped mid-session.
    Unhealthy,
    /// Any fault raised by the actor or decision source, caught at the
    /// session boundary.
    Fault(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub completed: u32,
    pub end: SessionEnd,
}

// ---------------------------------------------------------------------------
// Session context
// ---------------------------------------------------------------------------

/// Everything one worker session needs, handed in explicitly by the
/// supervisor.
pub struct SessionContext {
    pub account: Account,
    /// Session budget: `min(remaining quota, tasks-per-rotation cap)`.
    pub budget: u32,
    pub rotation: u32,
    pub ledger: Arc<StatusLedger>,
    pub monitor: Arc<HealthMonitor>,
    pub decisions: Arc<dyn DecisionSource>,
    pub records: Arc<dyn RecordSink>,
    pub pacing: PacingConfig,
}

// ---------------------------------------------------------------------------
// Session driver
// ---------------------------------------------------------------------------

/// Drive one account session against an actor: login, then fetch/decide/apply
/// until the budget is met, items run out, or the actor dies. Every fault is
/// caught here and folded into the outcome — the caller sees a crash
/// decision, never a propagated panic or error.
pub async fn run_session(actor: Arc<dyn WorkerActor>, ctx: SessionContext) -> SessionOutcome {
    let id = ctx.account.id.clone();
    ctx.ledger.start_account(&id, ctx.rotation, ctx.budget);
    info!(
        account = %id,
        budget = ctx.budget,
        rotation = ctx.rotation,
        "starting session"
    );

    match drive(&actor, &ctx).await {
        Ok(outcome) => outcome,
        Err(e) => {
            let completed = ctx.ledger.checkpoint(&id);
            warn!(account = %id, completed, error = %e, "session fault");
            SessionOutcome {
                completed,
                end: SessionEnd::Fault(e.to_string()),
            }
        }
    }
}

async fn drive(actor: &Arc<dyn WorkerActor>, ctx: &SessionContext) -> Result<SessionOutcome> {
    let id = &ctx.account.id;
    let mut completed: u32 = 0;

    actor.login(id, &ctx.account.credential).await?;

    let has_item = actor.navigate_to_work_area().await?;
    if !has_item && completed < ctx.budget {
        // The work surface opened straight onto a blank item.
        complete_blank(actor, ctx, &mut completed).await?;
    }

    while completed < ctx.budget {
        if !ctx.monitor.health_check(id).await {
            warn!(account = %id, completed, "actor unhealthy, ending session");
            return Ok(SessionOutcome {
                completed,
                end: SessionEnd::Unhealthy,
            });
        }

        match actor.fetch_next_item().await? {
            FetchedItem::Exhausted => {
                info!(account = %id, completed, "no more items available");
                return Ok(SessionOutcome {
                    completed,
                    end: SessionEnd::ItemsExhausted,
                });
            }
            FetchedItem::Blank => {
                complete_blank(actor, ctx, &mut completed).await?;
            }
            FetchedItem::Item(item_id) => {
                let secondary = actor.fetch_secondary_id().await.unwrap_or_default();
                let decision = ctx.decisions.decide(&item_id)?;

                sleep_for(review_delay(&ctx.pacing, &decision)).await;
                actor.apply_decision(&decision).await?;

                let record = CompletedRecord::new(
                    id,
                    &item_id,
                    &secondary,
                    decision.action_name(),
                    decision.applied_status(),
                    decision.notes(),
                );
                append_record(ctx, &record);

                completed += 1;
                bump_progress(ctx, completed);
                info!(
                    account = %id,
                    item = %item_id,
                    action = decision.action_name(),
                    progress = format!("{completed}/{}", ctx.budget),
                    "item completed"
                );
                sleep_for(submit_jitter(&ctx.pacing)).await;
            }
        }
    }

    info!(account = %id, completed, "session budget met");
    Ok(SessionOutcome {
        completed,
        end: SessionEnd::BudgetMet,
    })
}

/// Blank items get an automatic rejection and still count toward the budget.
async fn complete_blank(
    actor: &Arc<dyn WorkerActor>,
    ctx: &SessionContext,
    completed: &mut u32,
) -> Result<()> {
    let id = &ctx.account.id;
    warn!(account = %id, "blank item, auto-rejecting");

    let secondary = actor.fetch_secondary_id().await.unwrap_or_default();
    let decision = Decision::Reject {
        notes: BLANK_ITEM_NOTE.to_string(),
        rejection_notes: BLANK_ITEM_NOTE.to_string(),
    };
    actor.apply_decision(&decision).await?;

    let record = CompletedRecord::new(
        id,
        BLANK_ITEM_ID,
        &secondary,
        "Blank Task",
        decision.applied_status(),
        BLANK_ITEM_NOTE,
    );
    append_record(ctx, &record);

    *completed += 1;
    bump_progress(ctx, *completed);
    sleep_for(submit_jitter(&ctx.pacing)).await;
    Ok(())
}

fn bump_progress(ctx: &SessionContext, completed: u32) {
    ctx.ledger.update_progress(&ctx.account.id, completed);
    ctx.monitor.update_completed(&ctx.account.id, completed);
}

/// A record that fails to persist is reported loudly but does not kill the
/// session — the platform-side action already happened.
fn append_record(ctx: &SessionContext, record: &CompletedRecord) {
    if let Err(e) = ctx.records.append(record) {
        error!(account = %ctx.account.id, item = %record.item_id, error = %e,
            "failed to persist completed record");
    }
}

// ---------------------------------------------------------------------------
// Pacing
// ---------------------------------------------------------------------------

fn review_delay(pacing: &PacingConfig, decision: &Decision) -> Duration {
    let (min, max) = match decision {
        Decision::Accept { .. } => (pacing.accept_min, pacing.accept_max),
        Decision::Revise { .. } | Decision::Unsure { .. } => {
            (pacing.revise_min, pacing.revise_max)
        }
        Decision::Reject { .. } => (pacing.reject_min, pacing.reject_max),
    };
    uniform(min, max)
}

fn submit_jitter(pacing: &PacingConfig) -> Duration {
    uniform(pacing.submit_jitter_min, pacing.submit_jitter_max)
}

fn uniform(min: f64, max: f64) -> Duration {
    let min = min.max(0.0);
    let max = max.max(min);
    let secs = if max > min {
        rand::thread_rng().gen_range(min..=max)
    } else {
        min
    };
    Duration::from_secs_f64(secs)
}

async fn sleep_for(d: Duration) {
    if !d.is_zero() {
        tokio::time::sleep(d).await;
    }
}
