use std::process::Stdio;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::error::BridgeError;
use crate::types::{ActorRequest, ActorResponse};
use crate::Result;

// ─── ActorProcess ─────────────────────────────────────────────────────────

/// A running actor subprocess speaking line-delimited JSON over stdio: one
/// request line out, one response line back.
///
/// Stderr is drained by a background task and surfaced in process-exit
/// errors. The child is killed when this handle drops, so an aborted session
/// task cannot leak a browser.
pub(crate) struct ActorProcess {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    stdin: Option<ChildStdin>,
    stderr_buf: Arc<Mutex<String>>,
    stderr_task: Option<tokio::task::JoinHandle<()>>,
}

impl ActorProcess {
    /// Spawn `program args…` with piped stdio.
    pub(crate) fn spawn(program: &str, args: &[String]) -> Result<Self> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        Self::from_command(cmd)
    }

    pub(crate) fn from_command(mut cmd: Command) -> Result<Self> {
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(BridgeError::Io)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BridgeError::Process("stdout not captured".into()))?;

        let stdin = child.stdin.take();

        let stderr_buf = Arc::new(Mutex::new(String::new()));
        let stderr_task = child.stderr.take().map(|stderr| {
            let buf = Arc::clone(&stderr_buf);
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = reader.next_line().await {
                    if let Ok(mut b) = buf.lock() {
                        if !b.is_empty() {
                            b.push('\n');
                        }
                        b.push_str(&line);
                    }
                }
            })
        });

        let lines = BufReader::new(stdout).lines();
        Ok(Self {
            child,
            lines,
            stdin,
            stderr_buf,
            stderr_task,
        })
    }

    /// Write one request line to the subprocess.
    pub(crate) async fn send(&mut self, request: &ActorRequest) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| BridgeError::Process("stdin already closed".into()))?;

        let mut buf = serde_json::to_vec(request).map_err(|e| {
            BridgeError::Process(format!("failed to serialize request: {e}"))
        })?;
        buf.push(b'\n');

        stdin.write_all(&buf).await.map_err(BridgeError::Io)?;
        stdin.flush().await.map_err(BridgeError::Io)?;
        Ok(())
    }

    /// Read the next non-empty response line. EOF means the process died;
    /// captured stderr is included in the error.
    pub(crate) async fn recv(&mut self) -> Result<ActorResponse> {
        loop {
            match self.lines.next_line().await {
                Err(e) => return Err(BridgeError::Io(e)),
                Ok(None) => {
                    // Let the drain task finish so the captured stderr is
                    // complete before we report it.
                    if let Some(task) = self.stderr_task.take() {
                        let _ = task.await;
                    }
                    let stderr = self
                        .stderr_buf
                        .lock()
                        .ok()
                        .map(|b| b.clone())
                        .unwrap_or_default();
                    let msg = if stderr.is_empty() {
                        "actor process exited".to_string()
                    } else {
                        format!("actor process exited\nstderr: {stderr}")
                    };
                    return Err(BridgeError::Process(msg));
                }
                Ok(Some(line)) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    return serde_json::from_str::<ActorResponse>(trimmed).map_err(|e| {
                        BridgeError::Parse {
                            line: trimmed.to_owned(),
                            source: e,
                        }
                    });
                }
            }
        }
    }

    /// One request/response round trip. An `Error` response is surfaced as
    /// `BridgeError::Actor`.
    pub(crate) async fn request(&mut self, request: &ActorRequest) -> Result<ActorResponse> {
        self.send(request).await?;
        match self.recv().await? {
            ActorResponse::Error { message } => Err(BridgeError::Actor(message)),
            response => Ok(response),
        }
    }

    /// Whether the child is still running.
    pub(crate) fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Kill the subprocess (best-effort; errors are silently ignored).
    pub(crate) async fn kill(&mut self) {
        let _ = self.child.kill().await;
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
