//! Capture configuration and persisted settings

pub mod model;
pub mod settings;

pub use model::{parse_count, CaptureConfig, FilenameScheme, OutputFormat};
pub use settings::Settings;
