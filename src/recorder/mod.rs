//! Capture session runtime
//!
//! - LineSplitter turns dvgrab's carriage-return progress into lines
//! - LogFeed is the bounded, non-blocking log the front-end polls
//! - ProcessHandle supervises one dvgrab process group
//! - SessionCoordinator runs one capture at a time

pub mod coordinator;
pub mod lines;
pub mod log;
pub mod state;
pub mod supervisor;

pub use coordinator::{preview_command, SessionCoordinator, SessionEvent};
pub use lines::LineSplitter;
pub use log::{LineSource, LogFeed, LogLine, LOG_LINES_MAX};
pub use state::{SessionInfo, SessionOutcome, SessionState, SessionStatus};
pub use supervisor::{ProcessHandle, StopDelivery};
