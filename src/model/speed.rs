//! USB speed classes with scheduling boundaries.

use std::fmt;

/// Worst-case slot budget for a SuperSpeed bandwidth domain.
pub const SS_BW_BOUNDARY: u32 = 51000;

/// Worst-case microframe budget for a high-speed domain.
/// Table 5-5, high-speed isochronous transaction limits (USB 2.0).
pub const HS_BW_BOUNDARY: u32 = 6144;

/// USB speed classes that can reach a periodic schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UsbSpeed {
    /// USB 1.0 Low Speed - 1.5 Mbps
    Low,
    /// USB 1.1 Full Speed - 12 Mbps
    Full,
    /// USB 2.0 High Speed - 480 Mbps
    High,
    /// USB 3.0 SuperSpeed - 5 Gbps
    Super,
}

impl UsbSpeed {
    /// Parse from the spelling used in config files.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "ls" => Some(Self::Low),
            "full" | "fs" => Some(Self::Full),
            "high" | "hs" => Some(Self::High),
            "super" | "ss" => Some(Self::Super),
            _ => None,
        }
    }

    /// Low and full speed devices only reach the schedule through a TT.
    pub fn is_full_or_low(&self) -> bool {
        matches!(self, Self::Low | Self::Full)
    }

    /// Returns true for SuperSpeed.
    pub fn is_superspeed(&self) -> bool {
        matches!(self, Self::Super)
    }

    /// Highest worst-case slot load a domain of this speed may carry.
    ///
    /// Low/full speed endpoints are scheduled into the high-speed domain of
    /// their root port, so they inherit its boundary.
    pub fn bw_boundary(&self) -> u32 {
        match self {
            Self::Super => SS_BW_BOUNDARY,
            Self::Low | Self::Full | Self::High => HS_BW_BOUNDARY,
        }
    }

    /// Short display name for TUI.
    pub fn short_name(&self) -> &'static str {
        match self {
            Self::Low => "1.5M",
            Self::Full => "12M",
            Self::High => "480M",
            Self::Super => "5G",
        }
    }
}

impl fmt::Display for UsbSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Low => "Low Speed (1.5 Mbps)",
            Self::Full => "Full Speed (12 Mbps)",
            Self::High => "High Speed (480 Mbps)",
            Self::Super => "SuperSpeed (5 Gbps)",
        };
        write!(f, "{}", name)
    }
}
