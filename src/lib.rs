//! USB Periodic Bandwidth Scheduler
//!
//! Admission control for interrupt and isochronous endpoints on a
//! multi-speed USB host controller: budget tables, bandwidth domains and
//! the offset search, plus a CLI for replaying scenarios.

pub mod config;
pub mod model;
pub mod sched;
pub mod ui;

pub use config::Config;
pub use model::{DeviceContext, EndpointDescriptor, UsbSpeed};
pub use sched::{EncodedScheduleParams, SchedError, Scheduler};
