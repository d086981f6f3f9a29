//! Capture session coordinator
//!
//! Runs one dvgrab capture at a time: allocates the numbered folder, builds
//! the command line, hands it to the supervisor and tracks the lifecycle.

use super::log::LogFeed;
use super::state::{SessionInfo, SessionOutcome, SessionState, SessionStatus};
use super::supervisor::{ProcessHandle, StopDelivery};
use crate::config::model::CaptureConfig;
use crate::dvgrab::{build_args, shell_join};
use crate::output::allocator::{self, AllocationState};
use crate::utils::error::{CaptureError, CaptureResult};
use chrono::Utc;
use parking_lot::RwLock;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Folder creation retries when another writer takes the allocated name
const MAX_ALLOCATION_ATTEMPTS: usize = 3;

/// Events emitted during a capture session
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// dvgrab is running
    Started(SessionInfo),
    /// Interrupt sent to dvgrab
    StopRequested,
    /// dvgrab exited and its output is drained
    Finished(SessionOutcome),
    /// dvgrab could not be started
    SpawnFailed(String),
}

/// Owns the single capture slot
pub struct SessionCoordinator {
    /// Shared with the supervisor's wait task
    status: Arc<RwLock<SessionStatus>>,

    /// Log of every session run by this coordinator
    feed: LogFeed,

    /// Current or last process
    process: Option<ProcessHandle>,

    /// Event broadcaster
    event_tx: broadcast::Sender<SessionEvent>,
}

impl SessionCoordinator {
    pub fn new() -> Self {
        Self::with_feed(LogFeed::new())
    }

    pub fn with_feed(feed: LogFeed) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            status: Arc::new(RwLock::new(SessionStatus::default())),
            feed,
            process: None,
            event_tx,
        }
    }

    pub fn state(&self) -> SessionState {
        self.status.read().state
    }

    pub fn status(&self) -> SessionStatus {
        self.status.read().clone()
    }

    pub fn feed(&self) -> LogFeed {
        self.feed.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Start a capture
    ///
    /// The exclusive borrow of `allocations` keeps allocation and the
    /// counter update atomic for the caller.
    pub fn start(
        &mut self,
        config: &CaptureConfig,
        allocations: &mut AllocationState,
    ) -> CaptureResult<SessionInfo> {
        if self.status.read().is_active() {
            return Err(CaptureError::AlreadyRunning);
        }
        config.validate()?;

        let target_dir = create_target_dir(&config.base_dir(), config.prefix(), allocations)?;
        let argv = build_args(config, &target_dir);

        tracing::info!("Starting capture in: {:?}", target_dir);
        self.feed
            .note(format!("Starting capture in: {}", target_dir.display()), false);
        self.feed
            .note(format!("Command: {}", shell_join(&argv)), false);

        let info = SessionInfo {
            id: Uuid::new_v4(),
            target_dir: target_dir.clone(),
            argv: argv.clone(),
            started_at: Utc::now(),
        };
        *self.status.write() = SessionStatus {
            state: SessionState::Spawning,
            session: Some(info.clone()),
            outcome: None,
            finished_at: None,
        };

        let status = self.status.clone();
        let event_tx = self.event_tx.clone();
        let spawned = ProcessHandle::spawn(&argv, &target_dir, self.feed.clone(), move |outcome| {
            {
                let mut status = status.write();
                status.state = SessionState::Idle;
                status.outcome = Some(outcome.clone());
                status.finished_at = Some(Utc::now());
            }
            let _ = event_tx.send(SessionEvent::Finished(outcome.clone()));
        });

        let process = match spawned {
            Ok(process) => process,
            Err(e) => {
                let message = match &e {
                    CaptureError::Spawn { message, .. } => message.clone(),
                    other => other.to_string(),
                };
                {
                    let mut status = self.status.write();
                    status.state = SessionState::Idle;
                    status.outcome = Some(SessionOutcome::SpawnFailed {
                        message: message.clone(),
                    });
                    status.finished_at = Some(Utc::now());
                }
                let _ = self.event_tx.send(SessionEvent::SpawnFailed(message));
                return Err(e);
            }
        };

        {
            // A very short capture may already have finished
            let mut status = self.status.write();
            if status.state == SessionState::Spawning {
                status.state = SessionState::Running;
            }
        }
        self.process = Some(process);
        let _ = self.event_tx.send(SessionEvent::Started(info.clone()));

        tracing::info!("Capture started (session {})", info.id);
        Ok(info)
    }

    /// Ask the running capture to stop; no-op when nothing runs
    pub fn stop(&mut self) -> StopDelivery {
        let Some(process) = self.process.as_ref() else {
            return StopDelivery::NotRunning;
        };
        if process.is_finished() {
            return StopDelivery::NotRunning;
        }

        tracing::info!("Stopping capture");
        let delivery = process.stop();
        if matches!(
            delivery,
            StopDelivery::GroupInterrupt | StopDelivery::Terminate
        ) {
            {
                let mut status = self.status.write();
                if status.state == SessionState::Running {
                    status.state = SessionState::Stopping;
                }
            }
            self.feed.note("Stop signal sent.", false);
            let _ = self.event_tx.send(SessionEvent::StopRequested);
        }
        delivery
    }

    /// Wait until the current capture ends
    pub async fn wait(&self) -> Option<SessionOutcome> {
        match &self.process {
            Some(process) => process.wait().await,
            None => self.status.read().outcome.clone(),
        }
    }

    /// Join the finished session's tasks, waiting at most `timeout`
    ///
    /// A process that outlives the timeout is detached and the slot is
    /// freed for the next capture.
    pub async fn release(&mut self, timeout: Duration) -> bool {
        let Some(process) = self.take_process() else {
            return true;
        };
        let released = process.release(timeout).await;
        if !released {
            self.mark_detached();
        }
        released
    }

    /// Hand out the process handle so it can be released without holding
    /// a lock on the coordinator
    ///
    /// Once taken, `stop` no longer reaches the process.
    pub fn take_process(&mut self) -> Option<ProcessHandle> {
        self.process.take()
    }

    /// Free the slot after a process was detached by a timed-out release
    pub fn mark_detached(&mut self) {
        {
            let mut status = self.status.write();
            if !status.is_active() {
                return;
            }
            status.state = SessionState::Idle;
            status.outcome = Some(SessionOutcome::Detached);
            status.finished_at = Some(Utc::now());
        }
        tracing::warn!("Capture session detached from a running dvgrab");
        let _ = self
            .event_tx
            .send(SessionEvent::Finished(SessionOutcome::Detached));
    }

    /// Command line `start` would run, without side effects on the counter
    pub fn preview(
        &self,
        config: &CaptureConfig,
        allocations: &AllocationState,
    ) -> CaptureResult<Vec<String>> {
        preview_command(config, allocations)
    }
}

impl Default for SessionCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Preview allocation plus argument synthesis; never spawns
pub fn preview_command(
    config: &CaptureConfig,
    allocations: &AllocationState,
) -> CaptureResult<Vec<String>> {
    config.validate()?;
    let target_dir = allocator::preview(&config.base_dir(), config.prefix(), allocations)?;
    Ok(build_args(config, &target_dir))
}

/// Allocate and create the target folder
///
/// `create_dir` fails if another writer created the name after our scan;
/// the next allocation then sees it on disk.
fn create_target_dir(
    base: &Path,
    prefix: &str,
    allocations: &mut AllocationState,
) -> CaptureResult<PathBuf> {
    let mut last_err = None;
    for _ in 0..MAX_ALLOCATION_ATTEMPTS {
        let target = allocator::allocate(base, prefix, allocations)?;
        match fs::create_dir(&target) {
            Ok(()) => return Ok(target),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                tracing::warn!("{:?} appeared after allocation, retrying", target);
                last_err = Some(CaptureError::directory(target, e));
            }
            Err(e) => return Err(CaptureError::directory(target, e)),
        }
    }

    Err(last_err.unwrap_or_else(|| {
        CaptureError::directory(base, io::Error::from(io::ErrorKind::AlreadyExists))
    }))
}
