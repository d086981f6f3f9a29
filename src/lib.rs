//! dvgrab capture sessions
//!
//! Backend for DV tape capture front-ends: numbered output folders, dvgrab
//! command line synthesis, and supervision of the running capture with a
//! live log feed.

pub mod commands;
pub mod config;
pub mod dvgrab;
pub mod output;
pub mod recorder;
pub mod utils;

pub use config::{CaptureConfig, Settings};
pub use output::AllocationState;
pub use recorder::{SessionCoordinator, SessionOutcome, SessionState, SessionStatus};
pub use utils::error::{CaptureError, CaptureResult, ErrorResponse};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the tracing subscriber
///
/// `RUST_LOG` wins over `default_directive`. Output goes to stderr so
/// captured dvgrab output on stdout stays clean.
pub fn init_tracing(default_directive: &str) {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_directive.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
