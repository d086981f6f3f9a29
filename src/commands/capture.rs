//! Capture commands for front-ends
//!
//! Thin async wrappers over the coordinator that a UI shell can call
//! directly. Errors come back as serializable [`ErrorResponse`] values.

use crate::config::model::CaptureConfig;
use crate::dvgrab::{build_args, resolve_tool, shell_join};
use crate::output::{AllocationState, SharedAllocations};
use crate::recorder::{
    LogFeed, LogLine, SessionCoordinator, SessionInfo, SessionStatus, StopDelivery,
};
use crate::utils::error::ErrorResponse;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Application state for capturing
pub struct CaptureState {
    pub coordinator: Arc<Mutex<SessionCoordinator>>,
    pub allocations: SharedAllocations,
    /// Same feed the coordinator writes to, readable without its lock
    pub feed: LogFeed,
}

impl CaptureState {
    /// State seeded with persisted allocation counters
    pub fn new(allocations: AllocationState) -> Self {
        let feed = LogFeed::new();
        Self {
            coordinator: Arc::new(Mutex::new(SessionCoordinator::with_feed(feed.clone()))),
            allocations: SharedAllocations::new(allocations),
            feed,
        }
    }
}

impl Default for CaptureState {
    fn default() -> Self {
        Self::new(AllocationState::default())
    }
}

/// Command that a capture would run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandPreview {
    pub argv: Vec<String>,
    /// Shell-quoted rendering for display
    pub command_line: String,
}

/// Start a capture session
pub async fn start_capture(
    state: &CaptureState,
    config: CaptureConfig,
) -> Result<SessionInfo, ErrorResponse> {
    let mut coordinator = state.coordinator.lock().await;
    state
        .allocations
        .with_mut(|allocations| coordinator.start(&config, allocations))
        .map_err(ErrorResponse::from)
}

/// Stop the running capture; returns whether a signal was delivered
pub async fn stop_capture(state: &CaptureState) -> Result<bool, ErrorResponse> {
    let mut coordinator = state.coordinator.lock().await;
    Ok(matches!(
        coordinator.stop(),
        StopDelivery::GroupInterrupt | StopDelivery::Terminate
    ))
}

/// Get current session status
pub async fn get_capture_status(state: &CaptureState) -> Result<SessionStatus, ErrorResponse> {
    let coordinator = state.coordinator.lock().await;
    Ok(coordinator.status())
}

/// Take the log lines produced since the last poll
pub async fn poll_capture_log(state: &CaptureState) -> Result<Vec<LogLine>, ErrorResponse> {
    Ok(state.feed.drain())
}

/// Show the command a capture would run without consuming a folder index
pub async fn preview_capture_command(
    state: &CaptureState,
    config: CaptureConfig,
) -> Result<CommandPreview, ErrorResponse> {
    let coordinator = state.coordinator.lock().await;
    let argv = coordinator
        .preview(&config, &state.allocations.snapshot())
        .map_err(ErrorResponse::from)?;

    Ok(CommandPreview {
        command_line: shell_join(&argv),
        argv,
    })
}

/// Reserve the next numbered folder under `base_dir`
pub async fn allocate_capture_dir(
    state: &CaptureState,
    base_dir: String,
    prefix: String,
) -> Result<String, ErrorResponse> {
    let target = state
        .allocations
        .allocate(Path::new(&base_dir), &prefix)
        .map_err(ErrorResponse::from)?;
    Ok(target.to_string_lossy().to_string())
}

/// Argument vector for a config and an already chosen folder
pub async fn build_capture_args(
    config: CaptureConfig,
    target_dir: String,
) -> Result<Vec<String>, ErrorResponse> {
    Ok(build_args(&config, Path::new(&target_dir)))
}

/// Allocation counters to persist
pub async fn get_allocation_state(state: &CaptureState) -> Result<AllocationState, ErrorResponse> {
    Ok(state.allocations.snapshot())
}

/// Join a finished session's tasks; false if dvgrab had to be detached
///
/// The coordinator is only locked to take the handle out, so status and
/// log polling keep working while the release waits.
pub async fn release_capture(state: &CaptureState, timeout_ms: u64) -> Result<bool, ErrorResponse> {
    let process = state.coordinator.lock().await.take_process();
    let Some(process) = process else {
        return Ok(true);
    };

    let released = process.release(Duration::from_millis(timeout_ms)).await;
    if !released {
        state.coordinator.lock().await.mark_detached();
    }
    Ok(released)
}

/// Resolved path of the configured dvgrab, if it can be found
pub async fn locate_dvgrab(config: CaptureConfig) -> Result<Option<String>, ErrorResponse> {
    Ok(resolve_tool(config.tool()).map(|path| path.to_string_lossy().to_string()))
}
