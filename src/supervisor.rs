//! Supervision of the taptap observer process.
//!
//! The observer is started, its stdout is fed line by line into the
//! [`Ingestor`], and whenever the stream ends or anything fails the supervisor
//! waits a fixed delay and starts it again. There is no retry limit: the loop
//! only ends when the shutdown signal fires.
//!
//! ```text
//! Stopped -> Starting -> Running -> Exited | Crashed -> Backoff -> Starting -> ...
//! ```

use std::fmt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::pipeline::Ingestor;

/// Line-oriented stdout of a spawned observer.
pub type OutputStream = Box<dyn AsyncBufRead + Send + Unpin>;

/// Longest observer line accepted, newline included. Longer lines are
/// discarded up to the next newline and counted as parse errors.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// How long an observer that closed stdout may keep running before it is killed.
pub const REAP_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("observer stdout was not captured")]
    MissingStdout,

    #[error("failed to read observer output: {0}")]
    Read(#[source] std::io::Error),

    #[error("failed to reap observer: {0}")]
    Wait(#[source] std::io::Error),
}

/// Lifecycle of the supervised observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Stopped,
    Starting,
    Running,
    Exited,
    Crashed,
    Backoff,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SupervisorState::Stopped => "stopped",
            SupervisorState::Starting => "starting",
            SupervisorState::Running => "running",
            SupervisorState::Exited => "exited",
            SupervisorState::Crashed => "crashed",
            SupervisorState::Backoff => "backoff",
        };
        f.write_str(s)
    }
}

/// A started observer.
pub struct SpawnedChild {
    pub stdout: OutputStream,
    /// Process handle to reap once stdout closes. `None` for in-memory sources.
    pub child: Option<Child>,
}

/// Starts observer processes.
pub trait ProcessSpawner: Send + Sync {
    fn spawn(&self) -> Result<SpawnedChild, SupervisorError>;
}

/// `taptap observe --serial <device>`.
#[derive(Debug, Clone)]
pub struct TaptapCommand {
    pub binary: PathBuf,
    pub serial_device: String,
}

impl TaptapCommand {
    pub fn new(binary: impl Into<PathBuf>, serial_device: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            serial_device: serial_device.into(),
        }
    }
}

impl ProcessSpawner for TaptapCommand {
    fn spawn(&self) -> Result<SpawnedChild, SupervisorError> {
        let mut child = Command::new(&self.binary)
            .args(["observe", "--serial", &self.serial_device])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SupervisorError::Spawn {
                program: self.binary.display().to_string(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or(SupervisorError::MissingStdout)?;

        // Undrained stderr would eventually block the observer on a full pipe.
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(drain_stderr(stderr));
        }

        info!(
            "Started {} observe --serial {} (pid {:?})",
            self.binary.display(),
            self.serial_device,
            child.id()
        );

        Ok(SpawnedChild {
            stdout: Box::new(BufReader::new(stdout)),
            child: Some(child),
        })
    }
}

/// Reads observer stderr until EOF so the child never blocks on a full pipe.
async fn drain_stderr(stderr: ChildStderr) {
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::with_capacity(256);
    loop {
        match read_line_capped(&mut reader, &mut buf).await {
            Ok(LineRead::Eof) => break,
            Ok(LineRead::Complete) => {
                debug!(target: "taptap", "{}", String::from_utf8_lossy(&buf).trim_end())
            }
            Ok(LineRead::Overlong(len)) => {
                debug!(target: "taptap", "<{} bytes of stderr output>", len)
            }
            Err(e) => {
                debug!("Stopped reading observer stderr: {}", e);
                break;
            }
        }
    }
}

/// Outcome of reading one line with [`read_line_capped`].
#[derive(Debug, PartialEq, Eq)]
enum LineRead {
    Eof,
    /// `buf` holds the line, with its newline unless the stream ended first.
    Complete,
    /// The line exceeded [`MAX_LINE_BYTES`] and was skipped; total length.
    Overlong(usize),
}

/// Reads one line into `buf`, never buffering more than [`MAX_LINE_BYTES`].
async fn read_line_capped<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<LineRead>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    buf.clear();
    let n = (&mut *reader)
        .take(MAX_LINE_BYTES as u64)
        .read_until(b'\n', buf)
        .await?;
    if n == 0 {
        return Ok(LineRead::Eof);
    }
    if n < MAX_LINE_BYTES || buf.last() == Some(&b'\n') {
        return Ok(LineRead::Complete);
    }

    let mut skipped = n;
    loop {
        buf.clear();
        let n = (&mut *reader)
            .take(MAX_LINE_BYTES as u64)
            .read_until(b'\n', buf)
            .await?;
        skipped += n;
        if n == 0 || buf.last() == Some(&b'\n') {
            break;
        }
    }
    buf.clear();
    Ok(LineRead::Overlong(skipped))
}

/// Waits for an observer whose stdout closed, killing it after [`REAP_TIMEOUT`].
async fn reap(mut child: Child) -> Result<ExitStatus, SupervisorError> {
    match tokio::time::timeout(REAP_TIMEOUT, child.wait()).await {
        Ok(status) => status.map_err(SupervisorError::Wait),
        Err(_) => {
            warn!(
                "taptap closed stdout but is still running after {:?}, killing it",
                REAP_TIMEOUT
            );
            child.kill().await.map_err(SupervisorError::Wait)?;
            child.wait().await.map_err(SupervisorError::Wait)
        }
    }
}

/// Keeps the observer running and feeds its output to the ingestor.
pub struct Supervisor<S> {
    spawner: S,
    ingestor: Ingestor,
    restart_delay: Duration,
    state: watch::Sender<SupervisorState>,
}

impl<S: ProcessSpawner> Supervisor<S> {
    pub fn new(spawner: S, ingestor: Ingestor, restart_delay: Duration) -> Self {
        let (state, _) = watch::channel(SupervisorState::Stopped);
        Self {
            spawner,
            ingestor,
            restart_delay,
            state,
        }
    }

    /// Receiver tracking the supervisor's current state.
    pub fn subscribe(&self) -> watch::Receiver<SupervisorState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: SupervisorState) {
        debug!("Supervisor state -> {}", state);
        self.state.send_replace(state);
    }

    /// Runs until `shutdown` changes or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Supervisor started (restart delay {}s)",
            self.restart_delay.as_secs_f64()
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let outcome = tokio::select! {
                outcome = self.run_once() => outcome,
                _ = shutdown.changed() => break,
            };

            match outcome {
                Ok(Some(status)) => {
                    self.set_state(SupervisorState::Exited);
                    warn!("taptap exited ({}) - restarting in {:?}", status, self.restart_delay);
                }
                Ok(None) => {
                    self.set_state(SupervisorState::Exited);
                    warn!("taptap output closed - restarting in {:?}", self.restart_delay);
                }
                Err(e) => {
                    self.set_state(SupervisorState::Crashed);
                    error!("taptap crashed: {} - restarting in {:?}", e, self.restart_delay);
                }
            }

            self.set_state(SupervisorState::Backoff);
            self.ingestor.stats().child_restarts_total.inc();

            tokio::select! {
                _ = tokio::time::sleep(self.restart_delay) => {}
                _ = shutdown.changed() => break,
            }
        }

        self.set_state(SupervisorState::Stopped);
        info!("Supervisor stopped");
    }

    /// One observer lifetime: spawn, stream until EOF, reap.
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> Result<Option<ExitStatus>, SupervisorError> {
        self.set_state(SupervisorState::Starting);

        let SpawnedChild { mut stdout, child } = match self.spawner.spawn() {
            Ok(spawned) => spawned,
            Err(e) => {
                self.ingestor.stats().child_spawn_failures_total.inc();
                return Err(e);
            }
        };
        self.ingestor.stats().child_spawns_total.inc();
        self.set_state(SupervisorState::Running);

        let mut buf = Vec::with_capacity(512);
        loop {
            match read_line_capped(&mut stdout, &mut buf)
                .await
                .map_err(SupervisorError::Read)?
            {
                LineRead::Eof => break,
                LineRead::Overlong(len) => {
                    self.ingestor.reject_overlong(len);
                }
                LineRead::Complete => {
                    let line = String::from_utf8_lossy(&buf);
                    if line.trim().is_empty() {
                        continue;
                    }
                    // Failures are logged and counted by the ingestor.
                    let _ = self.ingestor.ingest_line(&line);
                }
            }
        }

        match child {
            Some(child) => reap(child).await.map(Some),
            None => Ok(None),
        }
    }
}
