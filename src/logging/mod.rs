//! Logging for the dataset builder
//!
//! This module provides:
//! - Bracketed log lines tagged with the current pipeline stage
//! - Dual logging (file + stdout)
//! - Log file naming with timestamps

mod formatter;
mod setup;

pub use setup::setup_logging;
