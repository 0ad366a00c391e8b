//! USB endpoint attributes consumed by the scheduler.

use std::fmt;

/// USB transfer types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferType {
    Control,
    Bulk,
    Interrupt,
    Isochronous,
}

impl TransferType {
    /// Parse from a config string.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "control" => Some(Self::Control),
            "bulk" => Some(Self::Bulk),
            "interrupt" | "int" => Some(Self::Interrupt),
            "isoc" | "isochronous" => Some(Self::Isochronous),
            _ => None,
        }
    }

    /// Returns true if this transfer type reserves periodic bandwidth.
    /// Only Interrupt and Isochronous endpoints do.
    pub fn is_periodic(&self) -> bool {
        matches!(self, Self::Interrupt | Self::Isochronous)
    }
}

impl fmt::Display for TransferType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Control => "Control",
            Self::Bulk => "Bulk",
            Self::Interrupt => "Interrupt",
            Self::Isochronous => "Isochronous",
        };
        write!(f, "{}", name)
    }
}

/// Endpoint direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    /// Parse from a config string.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "in" => Some(Self::In),
            "out" => Some(Self::Out),
            _ => None,
        }
    }

    /// Direction encoded in bit 7 of an endpoint address.
    pub fn from_address(address: u8) -> Self {
        if address & 0x80 != 0 { Self::In } else { Self::Out }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::In => write!(f, "IN"),
            Self::Out => write!(f, "OUT"),
        }
    }
}

/// Identity of an endpoint on the controller: device slot plus address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EndpointId {
    pub slot_id: u8,
    pub address: u8,
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot{}/EP{:02X}", self.slot_id, self.address)
    }
}

/// Endpoint attributes as programmed into the endpoint context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointDescriptor {
    /// Endpoint address (e.g., 0x81 = IN endpoint 1, 0x02 = OUT endpoint 2).
    pub address: u8,
    /// Transfer type.
    pub transfer_type: TransferType,
    /// Direction.
    pub direction: Direction,
    /// Decoded maximum packet size in bytes.
    pub max_packet_size: u32,
    /// Additional transaction opportunities per service interval
    /// (high-speed mult bits, or the SuperSpeed bMaxBurst value).
    pub max_burst: u32,
    /// SuperSpeed isochronous Mult field.
    pub mult: u32,
    /// Interval exponent: the service interval is 2^interval slots.
    pub interval: u32,
    /// Max ESIT payload in bytes (wBytesPerInterval). Zero when the device
    /// does not report one.
    pub max_esit_payload: u32,
}

impl EndpointDescriptor {
    /// Periodic endpoint with only the mandatory attributes set.
    pub fn new(
        address: u8,
        transfer_type: TransferType,
        max_packet_size: u32,
        interval: u32,
    ) -> Self {
        Self {
            address,
            transfer_type,
            direction: Direction::from_address(address),
            max_packet_size,
            max_burst: 0,
            mult: 0,
            interval,
            max_esit_payload: 0,
        }
    }

    pub fn with_burst(mut self, max_burst: u32, mult: u32) -> Self {
        self.max_burst = max_burst;
        self.mult = mult;
        self
    }

    pub fn with_esit_payload(mut self, max_esit_payload: u32) -> Self {
        self.max_esit_payload = max_esit_payload;
        self
    }

    pub fn is_in(&self) -> bool {
        self.direction == Direction::In
    }
}

impl fmt::Display for EndpointDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EP{:02X} {} {} {}B @ 2^{}",
            self.address, self.transfer_type, self.direction, self.max_packet_size, self.interval
        )
    }
}
