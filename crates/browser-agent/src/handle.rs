use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use drover_core::config::ActorCommand;
use drover_core::{
    Account, ActorFactory, Credential, Decision, DroverError, FetchedItem, WorkerActor,
};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::BridgeError;
use crate::process::ActorProcess;
use crate::types::{ActorRequest, ActorResponse};

/// How long a liveness ping may take before the actor reads as dead.
const PING_TIMEOUT: Duration = Duration::from_secs(10);

// ─── BrowserActor ─────────────────────────────────────────────────────────

/// A live browser actor session behind the scheduler's capability interface.
///
/// All operations serialize through one lock — the protocol is strictly
/// request/response — while `is_alive` also consults a dead flag so a session
/// that already failed reads as dead without waiting on the lock holder.
pub struct BrowserActor {
    inner: Mutex<ActorProcess>,
    alive: AtomicBool,
}

impl BrowserActor {
    fn new(process: ActorProcess) -> Self {
        Self {
            inner: Mutex::new(process),
            alive: AtomicBool::new(true),
        }
    }

    #[cfg(test)]
    pub(crate) fn from_command(cmd: tokio::process::Command) -> crate::Result<Self> {
        Ok(Self::new(ActorProcess::from_command(cmd)?))
    }

    /// One round trip; any failure marks the session dead so the health
    /// monitor retires it on its next sweep.
    async fn call(&self, request: &ActorRequest) -> crate::Result<ActorResponse> {
        if !self.alive.load(Ordering::Relaxed) {
            return Err(BridgeError::Process("actor session is dead".into()));
        }
        let mut process = self.inner.lock().await;
        match process.request(request).await {
            Ok(response) => Ok(response),
            Err(e) => {
                self.alive.store(false, Ordering::Relaxed);
                Err(e)
            }
        }
    }
}

fn fault(e: BridgeError) -> DroverError {
    DroverError::ActorFault(e.to_string())
}

#[async_trait::async_trait]
impl WorkerActor for BrowserActor {
    async fn login(&self, account_id: &str, credential: &Credential) -> drover_core::Result<()> {
        let request = ActorRequest::Login {
            account: account_id.to_string(),
            credential: credential.reveal().to_string(),
        };
        match self.call(&request).await.map_err(fault)? {
            ActorResponse::Ok { .. } => Ok(()),
            other => Err(DroverError::ActorFault(format!(
                "unexpected login response: {other:?}"
            ))),
        }
    }

    async fn navigate_to_work_area(&self) -> drover_core::Result<bool> {
        match self.call(&ActorRequest::Navigate).await.map_err(fault)? {
            ActorResponse::Ok { has_item } => Ok(has_item.unwrap_or(true)),
            other => Err(DroverError::ActorFault(format!(
                "unexpected navigate response: {other:?}"
            ))),
        }
    }

    async fn fetch_next_item(&self) -> drover_core::Result<FetchedItem> {
        match self.call(&ActorRequest::FetchItem).await.map_err(fault)? {
            ActorResponse::Item { id } => Ok(FetchedItem::Item(id)),
            ActorResponse::Blank => Ok(FetchedItem::Blank),
            ActorResponse::Exhausted => Ok(FetchedItem::Exhausted),
            other => Err(DroverError::ActorFault(format!(
                "unexpected fetch response: {other:?}"
            ))),
        }
    }

    async fn fetch_secondary_id(&self) -> drover_core::Result<String> {
        match self.call(&ActorRequest::FetchUid).await.map_err(fault)? {
            ActorResponse::Uid { value } => Ok(value),
            other => Err(DroverError::ActorFault(format!(
                "unexpected uid response: {other:?}"
            ))),
        }
    }

    async fn apply_decision(&self, decision: &Decision) -> drover_core::Result<()> {
        let request = ActorRequest::Apply {
            decision: decision.clone(),
        };
        match self.call(&request).await.map_err(fault)? {
            ActorResponse::Ok { .. } => Ok(()),
            other => Err(DroverError::ActorFault(format!(
                "unexpected apply response: {other:?}"
            ))),
        }
    }

    async fn is_alive(&self) -> bool {
        if !self.alive.load(Ordering::Relaxed) {
            return false;
        }
        let mut process = self.inner.lock().await;
        if !process.is_running() {
            self.alive.store(false, Ordering::Relaxed);
            return false;
        }
        let ping = tokio::time::timeout(PING_TIMEOUT, process.request(&ActorRequest::Ping)).await;
        match ping {
            Ok(Ok(ActorResponse::Ok { .. })) => true,
            Ok(Ok(other)) => {
                warn!(?other, "unexpected ping response");
                self.alive.store(false, Ordering::Relaxed);
                false
            }
            Ok(Err(e)) => {
                debug!(error = %e, "ping failed");
                self.alive.store(false, Ordering::Relaxed);
                false
            }
            Err(_) => {
                debug!("ping timed out");
                self.alive.store(false, Ordering::Relaxed);
                false
            }
        }
    }

    async fn close(&self) {
        self.alive.store(false, Ordering::Relaxed);
        let mut process = self.inner.lock().await;
        // Ask nicely, then make sure.
        let _ = process.send(&ActorRequest::Close).await;
        process.kill().await;
    }
}

// ─── BrowserActorFactory ──────────────────────────────────────────────────

/// Spawns one actor subprocess per session from the configured command.
pub struct BrowserActorFactory {
    command: ActorCommand,
}

impl BrowserActorFactory {
    pub fn new(command: ActorCommand) -> Self {
        Self { command }
    }
}

#[async_trait::async_trait]
impl ActorFactory for BrowserActorFactory {
    async fn connect(&self, account: &Account) -> drover_core::Result<Arc<dyn WorkerActor>> {
        if self.command.program.is_empty() {
            return Err(DroverError::InvalidConfig(
                "actor_command.program is not set".into(),
            ));
        }
        debug!(account = %account.id, program = %self.command.program, "spawning actor process");
        let process =
            ActorProcess::spawn(&self.command.program, &self.command.args).map_err(fault)?;
        Ok(Arc::new(BrowserActor::new(process)))
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use tokio::process::Command;

    /// Emits the scripted response lines up front, then keeps draining stdin
    /// so request writes never hit a closed pipe.
    fn scripted(lines: &[&str]) -> BrowserActor {
        let mut f = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(f, "{line}").unwrap();
        }
        let (_, path) = f.keep().unwrap();
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(format!("cat '{}'; exec cat >/dev/null", path.display()));
        BrowserActor::from_command(cmd).unwrap()
    }

    #[tokio::test]
    async fn login_and_fetch_flow() {
        let actor = scripted(&[
            r#"{"status":"ok"}"#,
            r#"{"status":"ok","has_item":true}"#,
            r#"{"status":"item","id":"task-1"}"#,
            r#"{"status":"uid","value":"6dd9f981"}"#,
            r#"{"status":"ok"}"#,
        ]);

        actor
            .login("g007", &Credential::new("pw"))
            .await
            .unwrap();
        assert!(actor.navigate_to_work_area().await.unwrap());
        assert_eq!(
            actor.fetch_next_item().await.unwrap(),
            FetchedItem::Item("task-1".into())
        );
        assert_eq!(actor.fetch_secondary_id().await.unwrap(), "6dd9f981");
        actor
            .apply_decision(&Decision::Accept { notes: "ok".into() })
            .await
            .unwrap();
        actor.close().await;
    }

    #[tokio::test]
    async fn blank_and_exhausted_map_through() {
        let actor = scripted(&[r#"{"status":"blank"}"#, r#"{"status":"exhausted"}"#]);
        assert_eq!(actor.fetch_next_item().await.unwrap(), FetchedItem::Blank);
        assert_eq!(
            actor.fetch_next_item().await.unwrap(),
            FetchedItem::Exhausted
        );
        actor.close().await;
    }

    #[tokio::test]
    async fn actor_error_becomes_fault() {
        let actor = scripted(&[r#"{"status":"error","message":"selector missing"}"#]);
        let err = actor.fetch_next_item().await.unwrap_err();
        assert!(matches!(err, DroverError::ActorFault(m) if m.contains("selector missing")));
        actor.close().await;
    }

    #[tokio::test]
    async fn wrong_variant_is_a_fault() {
        // `fetch_uid` answered with an item id: protocol violation.
        let actor = scripted(&[r#"{"status":"item","id":"task-1"}"#]);
        let err = actor.fetch_secondary_id().await.unwrap_err();
        assert!(matches!(err, DroverError::ActorFault(_)));
        actor.close().await;
    }

    #[tokio::test]
    async fn failed_call_marks_session_dead() {
        // Consumes the request, then exits without answering.
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("read -r _line");
        let actor = BrowserActor::from_command(cmd).unwrap();
        assert!(actor.fetch_next_item().await.is_err());
        assert!(!actor.is_alive().await);
        // Subsequent calls short-circuit.
        let err = actor.fetch_next_item().await.unwrap_err();
        assert!(matches!(err, DroverError::ActorFault(_)));
    }

    #[tokio::test]
    async fn factory_requires_a_program() {
        let factory = BrowserActorFactory::new(ActorCommand::default());
        let account = Account {
            id: "g007".into(),
            credential: Credential::new("pw"),
            quota: 1,
        };
        assert!(matches!(
            factory.connect(&account).await,
            Err(DroverError::InvalidConfig(_))
        ));
    }
}
