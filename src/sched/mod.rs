//! Periodic bandwidth scheduling.

pub mod budget;
pub mod domain;
pub mod params;
pub mod scheduler;
pub mod selector;

pub use budget::{ESIT_MAX, SchedEntry};
pub use domain::BandwidthDomain;
pub use params::EncodedScheduleParams;
pub use scheduler::{Scheduler, need_bw_sch};
pub use selector::DomainLayout;

use crate::model::TransferType;
use thiserror::Error;

/// Errors that can occur while scheduling an endpoint.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchedError {
    #[error("out of memory")]
    AllocationFailure,
    #[error("not enough bandwidth: worst slot {worst_bw} exceeds {boundary}")]
    CapacityExceeded { worst_bw: u32, boundary: u32 },
    #[error("root port {port} has no bandwidth domain")]
    PortOutOfRange { port: u8 },
    #[error("{field} value {value} does not fit the endpoint context")]
    FieldOverflow { field: &'static str, value: u64 },
    #[error("{transfer_type} endpoints are not scheduled")]
    NotPeriodic { transfer_type: TransferType },
    #[error("endpoint {address:#04x} of slot {slot} is already scheduled")]
    AlreadyScheduled { slot: u8, address: u8 },
}
