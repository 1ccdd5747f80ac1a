//! Plugin task scheduler runner.
//!
//! Split into focused submodules:
//! - `core`: Scheduler struct, handle, registration, and accessor methods
//! - `execution`: main loop, queue processing, and completion handling
//! - `scheduling`: item updates, plugin activation and shutdown

mod core;
mod execution;
mod scheduling;

pub use self::core::{Scheduler, SchedulerHandle};
