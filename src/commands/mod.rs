//! Command handlers
//!
//! The narrow interface a front-end calls into.

pub mod capture;

pub use capture::CaptureState;
