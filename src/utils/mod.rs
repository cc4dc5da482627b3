//! Utility functions and helpers
//!
//! Atomic file writes and time handling.

pub mod atomic;
pub mod time;

pub use atomic::{atomic_write, atomic_write_with, cleanup_temp_files};
pub use time::{Clock, ManualClock, SystemClock};
