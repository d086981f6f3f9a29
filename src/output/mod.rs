//! Output folder management

pub mod allocator;

pub use allocator::{allocate, preview, AllocationState, SharedAllocations};
