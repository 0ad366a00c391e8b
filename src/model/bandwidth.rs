//! Slot usage summaries and formatting.

/// Occupancy of one bandwidth domain, measured against its boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotUsage {
    /// Highest load on any single slot.
    pub peak: u32,
    /// Index of the first slot carrying `peak`.
    pub peak_slot: usize,
    /// Sum of all slot loads over one full schedule period.
    pub total: u64,
    /// Boundary no slot may exceed.
    pub boundary: u32,
}

impl SlotUsage {
    /// Summarise a slot array against a boundary.
    pub fn from_slots(slots: &[u32], boundary: u32) -> Self {
        let mut peak = 0;
        let mut peak_slot = 0;
        for (i, &bw) in slots.iter().enumerate() {
            if bw > peak {
                peak = bw;
                peak_slot = i;
            }
        }
        Self {
            peak,
            peak_slot,
            total: slots.iter().map(|&bw| u64::from(bw)).sum(),
            boundary,
        }
    }

    /// Peak slot load as a percentage of the boundary (0.0 - 100.0+).
    pub fn peak_percent(&self) -> f64 {
        if self.boundary == 0 {
            return 0.0;
        }
        (self.peak as f64 / self.boundary as f64) * 100.0
    }

    /// Headroom left on the busiest slot.
    pub fn headroom(&self) -> u32 {
        self.boundary.saturating_sub(self.peak)
    }

    /// Check if the busiest slot is near capacity (>80%).
    pub fn is_high_usage(&self) -> bool {
        self.peak_percent() > 80.0
    }

    /// Check if the busiest slot is critical (>95%).
    pub fn is_critical(&self) -> bool {
        self.peak_percent() > 95.0
    }
}

/// Format a slot load as "used/boundary".
pub fn format_load(bw: u32, boundary: u32) -> String {
    format!("{}/{}", bw, boundary)
}

/// Generate an ASCII bar for bandwidth usage.
pub fn bandwidth_bar(percent: f64, width: usize) -> String {
    format!("[{}]", simple_bar(percent, width))
}

/// Generate a simple ASCII bar without brackets.
pub fn simple_bar(percent: f64, width: usize) -> String {
    let filled = ((percent / 100.0) * width as f64).round() as usize;
    let filled = filled.min(width);
    let empty = width.saturating_sub(filled);

    format!("{}{}", "▓".repeat(filled), "░".repeat(empty))
}
