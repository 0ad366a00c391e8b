//! Device context as seen by the scheduler.

use super::speed::UsbSpeed;

/// The slice of an xHCI device slot that scheduling depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceContext {
    /// xHCI slot id.
    pub slot_id: u8,
    /// Negotiated device speed.
    pub speed: UsbSpeed,
    /// Root port number as reported by the controller. Ports are numbered
    /// from 1: USB3 ports first, then USB2 ports.
    pub real_port: u8,
    /// True when the device sits behind a high-speed hub's transaction
    /// translator.
    pub has_tt: bool,
}

impl DeviceContext {
    pub fn new(slot_id: u8, speed: UsbSpeed, real_port: u8) -> Self {
        Self {
            slot_id,
            speed,
            real_port,
            has_tt: false,
        }
    }

    /// Mark the device as attached through a TT.
    pub fn behind_tt(mut self) -> Self {
        self.has_tt = true;
        self
    }
}
