//! Bandwidth domains and the offset search.

use log::trace;

use super::SchedError;
use super::budget::{ESIT_MAX, SchedEntry};
use crate::model::{EndpointId, SlotUsage};

/// Shared periodic schedule of one root port (or one direction of a
/// SuperSpeed root port).
///
/// `slots[s]` always equals the sum of the budget contributions of every
/// member whose pattern covers slot `s`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandwidthDomain {
    slots: [u32; ESIT_MAX],
    members: Vec<SchedEntry>,
}

impl Default for BandwidthDomain {
    fn default() -> Self {
        Self::new()
    }
}

impl BandwidthDomain {
    /// Create an empty domain.
    pub fn new() -> Self {
        Self {
            slots: [0; ESIT_MAX],
            members: Vec::new(),
        }
    }

    /// Accumulated load of every slot.
    pub fn slots(&self) -> &[u32] {
        &self.slots
    }

    /// Endpoints currently admitted.
    pub fn members(&self) -> &[SchedEntry] {
        &self.members
    }

    pub fn contains(&self, id: EndpointId) -> bool {
        self.members.iter().any(|m| m.id == id)
    }

    /// Occupancy summary against a boundary.
    pub fn usage(&self, boundary: u32) -> SlotUsage {
        SlotUsage::from_slots(&self.slots, boundary)
    }

    /// Worst slot load if `entry` were scheduled at `offset`.
    pub fn max_bw(&self, entry: &SchedEntry, offset: usize) -> u32 {
        let mut max_bw = 0;
        for base in (offset..ESIT_MAX).step_by(entry.esit) {
            for (j, &cost) in entry.budget_table.iter().enumerate() {
                let bw = self.slots[base + j].saturating_add(cost);
                max_bw = max_bw.max(bw);
            }
        }
        max_bw
    }

    /// Add (`used`) or remove the contribution of `entry` at its offset.
    pub fn update(&mut self, entry: &SchedEntry, used: bool) {
        for base in (entry.offset..ESIT_MAX).step_by(entry.esit) {
            for (j, &cost) in entry.budget_table.iter().enumerate() {
                let slot = &mut self.slots[base + j];
                *slot = if used {
                    slot.saturating_add(cost)
                } else {
                    slot.saturating_sub(cost)
                };
            }
        }
    }

    /// True when some member already starts at `offset`.
    pub fn offset_used(&self, offset: usize) -> bool {
        self.members.iter().any(|m| m.offset == offset)
    }

    /// Find the offset whose worst slot load is lowest, and commit `entry`
    /// there if that load stays within `boundary`.
    ///
    /// On ties an offset no member starts at wins. Start-splits are never
    /// placed in microframe Y6 (USB 2.0 11.18). The slot array is left
    /// untouched on failure.
    pub fn check_bandwidth(
        &mut self,
        entry: &mut SchedEntry,
        boundary: u32,
    ) -> Result<(), SchedError> {
        let num = entry.num_budget_slots();
        let mut best: Option<(u32, usize)> = None;

        for offset in 0..entry.esit {
            if offset + num > entry.esit {
                break;
            }
            if entry.speed.is_full_or_low() && offset % 8 == 6 {
                continue;
            }

            let worst_bw = self.max_bw(entry, offset);
            trace!("{}: offset {} worst {}", entry.id, offset, worst_bw);

            best = match best {
                None => Some((worst_bw, offset)),
                Some((min_bw, _)) if worst_bw < min_bw => Some((worst_bw, offset)),
                Some((min_bw, min_index))
                    if worst_bw == min_bw
                        && self.offset_used(min_index)
                        && !self.offset_used(offset) =>
                {
                    Some((min_bw, offset))
                }
                keep => keep,
            };
            if matches!(best, Some((0, _))) {
                break;
            }
        }

        let Some((min_bw, min_index)) = best else {
            return Err(SchedError::CapacityExceeded {
                worst_bw: u32::MAX,
                boundary,
            });
        };
        if min_bw > boundary {
            return Err(SchedError::CapacityExceeded {
                worst_bw: min_bw,
                boundary,
            });
        }

        entry.offset = min_index;
        self.update(entry, true);
        Ok(())
    }

    /// Admit `entry` and keep it as a member.
    pub fn admit(&mut self, mut entry: SchedEntry, boundary: u32) -> Result<&SchedEntry, SchedError> {
        self.members
            .try_reserve(1)
            .map_err(|_| SchedError::AllocationFailure)?;
        self.check_bandwidth(&mut entry, boundary)?;
        self.members.push(entry);
        let last = self.members.len() - 1;
        Ok(&self.members[last])
    }

    /// Remove the member with `id`, taking its load off the slots.
    pub fn release(&mut self, id: EndpointId) -> Option<SchedEntry> {
        let pos = self.members.iter().position(|m| m.id == id)?;
        let entry = self.members.remove(pos);
        self.update(&entry, false);
        Some(entry)
    }

    /// Drop every member and clear the slots. Returns how many were held.
    pub fn clear(&mut self) -> usize {
        let count = self.members.len();
        self.members.clear();
        self.slots = [0; ESIT_MAX];
        count
    }
}
