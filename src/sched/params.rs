//! Encoded schedule parameters handed back to the endpoint context.

use super::SchedError;
use super::budget::SchedEntry;

/// Bit widths of the encoded fields.
pub const PKTS_BITS: u32 = 6;
pub const CS_COUNT_BITS: u32 = 3;
pub const BURST_MODE_BITS: u32 = 1;
pub const OFFSET_BITS: u32 = 14;
pub const REPEAT_BITS: u32 = 15;

const fn field_max(bits: u32) -> u32 {
    (1 << bits) - 1
}

/// Schedule parameters of an admitted endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EncodedScheduleParams {
    pub pkts: u8,
    pub cs_count: u8,
    pub burst_mode: bool,
    pub offset: u16,
    pub repeat: u16,
}

impl EncodedScheduleParams {
    /// Encoding for periodic endpoints the root hub schedules itself:
    /// one packet per service opportunity, nothing else.
    pub fn single_packet() -> Self {
        Self {
            pkts: 1,
            ..Self::default()
        }
    }

    /// Encode an admitted entry. Widths are checked when the entry is built.
    pub fn from_entry(entry: &SchedEntry) -> Self {
        Self {
            pkts: entry.pkts as u8,
            cs_count: entry.cs_count as u8,
            burst_mode: entry.burst_mode,
            offset: entry.offset as u16,
            repeat: u16::from(entry.repeat),
        }
    }

    /// Pack into the two reserved endpoint-context words.
    ///
    /// word 0: pkts[5:0], cs_count[10:8], burst_mode[11]
    /// word 1: offset[13:0], repeat[30:16]
    pub fn context_words(&self) -> [u32; 2] {
        let word0 = (u32::from(self.pkts) & field_max(PKTS_BITS))
            | ((u32::from(self.cs_count) & field_max(CS_COUNT_BITS)) << 8)
            | (u32::from(self.burst_mode) << 11);
        let word1 = (u32::from(self.offset) & field_max(OFFSET_BITS))
            | ((u32::from(self.repeat) & field_max(REPEAT_BITS)) << 16);
        [word0, word1]
    }
}

/// Reject entries whose parameters cannot be represented in the context.
pub(crate) fn check_widths(entry: &SchedEntry) -> Result<(), SchedError> {
    let fields = [
        ("pkts", entry.pkts as u64, PKTS_BITS),
        ("cs_count", entry.cs_count as u64, CS_COUNT_BITS),
        ("burst_mode", u64::from(entry.burst_mode), BURST_MODE_BITS),
        // the offset always lies inside the interval
        ("offset", entry.esit.saturating_sub(1) as u64, OFFSET_BITS),
        ("repeat", u64::from(entry.repeat), REPEAT_BITS),
    ];
    for (field, value, bits) in fields {
        if value > u64::from(field_max(bits)) {
            return Err(SchedError::FieldOverflow { field, value });
        }
    }
    Ok(())
}
