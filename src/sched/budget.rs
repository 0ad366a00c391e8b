//! Per-endpoint bandwidth budget tables.
//!
//! A budget table lists the bandwidth an endpoint consumes in each slot
//! (microframe) of one service interval, starting at its scheduled offset.
//! Summed over the table it equals the bytes the endpoint moves per
//! interval.

use super::SchedError;
use super::params;
use log::debug;
use crate::model::{DeviceContext, EndpointDescriptor, EndpointId, TransferType, UsbSpeed};

/// Longest repeating pattern, in slots, the controller tracks.
pub const ESIT_MAX: usize = 64;

/// At most 188 full-speed bytes fit in one microframe (USB 2.0 11.18.1).
pub const FS_PAYLOAD_MAX: u32 = 188;

/// Longest split transaction: 1 start-split + 1 idle + 7 complete-splits.
pub const TT_MICROFRAMES_MAX: usize = 9;

/// Scheduling state of one periodic endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedEntry {
    /// Endpoint this entry was built for.
    pub id: EndpointId,
    pub speed: UsbSpeed,
    pub transfer_type: TransferType,
    /// Service interval in slots, a power of two no larger than `ESIT_MAX`.
    pub esit: usize,
    /// Packets per service opportunity.
    pub pkts: u32,
    /// Complete-split count; only non-zero for split transactions.
    pub cs_count: u32,
    /// SuperSpeed burst mode.
    pub burst_mode: bool,
    /// The service pattern spans more than one slot per interval.
    pub repeat: bool,
    /// First slot of the pattern within one interval. Assigned on admission.
    pub offset: usize,
    /// Steady-state cost of every budget slot but the last.
    pub bw_cost_per_slot: u32,
    /// Cost of each slot relative to `offset`.
    pub budget_table: Vec<u32>,
}

impl SchedEntry {
    /// Derive the budget table of an endpoint from its attributes.
    ///
    /// The offset is left at zero; it is chosen when the entry is admitted
    /// into a domain.
    pub fn build(device: &DeviceContext, ep: &EndpointDescriptor) -> Result<Self, SchedError> {
        if !ep.transfer_type.is_periodic() {
            return Err(SchedError::NotPeriodic {
                transfer_type: ep.transfer_type,
            });
        }

        if 1usize.checked_shl(ep.interval).is_none_or(|slots| slots > ESIT_MAX) {
            debug!(
                "slot {} EP{:02X}: interval 2^{} clamped to {} slots",
                device.slot_id, ep.address, ep.interval, ESIT_MAX
            );
        }

        let mut entry = Self {
            id: EndpointId {
                slot_id: device.slot_id,
                address: ep.address,
            },
            speed: device.speed,
            transfer_type: ep.transfer_type,
            esit: esit_slots(ep.interval),
            pkts: 0,
            cs_count: 0,
            burst_mode: false,
            repeat: false,
            offset: 0,
            bw_cost_per_slot: 0,
            budget_table: Vec::new(),
        };

        match device.speed {
            UsbSpeed::High => entry.setup_high_speed(ep)?,
            UsbSpeed::Super => entry.setup_super_speed(ep)?,
            UsbSpeed::Full | UsbSpeed::Low => entry.setup_split(ep)?,
        }

        params::check_widths(&entry)?;
        Ok(entry)
    }

    /// Number of slots the pattern occupies per interval.
    pub fn num_budget_slots(&self) -> usize {
        self.budget_table.len()
    }

    /// Bytes consumed per service interval.
    pub fn bytes_per_interval(&self) -> u64 {
        self.budget_table.iter().map(|&bw| u64::from(bw)).sum()
    }

    fn setup_high_speed(&mut self, ep: &EndpointDescriptor) -> Result<(), SchedError> {
        // USB 2.0 5.9: one microframe per interval is enough; max_burst
        // counts the additional transactions in that microframe.
        self.pkts = ep
            .max_burst
            .checked_add(1)
            .ok_or_else(|| pkts_overflow(u64::from(ep.max_burst) + 1))?;
        self.bw_cost_per_slot = ep.max_packet_size.saturating_mul(self.pkts);
        self.budget_table = alloc_table(1)?;
        self.budget_table[0] = self.bw_cost_per_slot;
        Ok(())
    }

    fn setup_super_speed(&mut self, ep: &EndpointDescriptor) -> Result<(), SchedError> {
        self.burst_mode = true;
        let maxpkt = ep.max_packet_size;

        // Some devices report wBytesPerInterval as 0; fall back to the
        // mult and burst fields.
        let mut esit_pkts = div_round_up(ep.max_esit_payload, maxpkt);
        if esit_pkts == 0 {
            let fallback = (u64::from(ep.mult) + 1).saturating_mul(u64::from(ep.max_burst) + 1);
            esit_pkts = u32::try_from(fallback).map_err(|_| pkts_overflow(fallback))?;
        }

        if ep.transfer_type == TransferType::Interrupt {
            self.pkts = esit_pkts;
            self.bw_cost_per_slot = maxpkt.saturating_mul(self.pkts);
            self.budget_table = alloc_table(1)?;
            self.budget_table[0] = self.bw_cost_per_slot;
            return Ok(());
        }

        let esit = self.esit as u32;
        self.pkts = if esit == 1 {
            esit_pkts
        } else if esit_pkts <= esit {
            1
        } else {
            esit_pkts
                .checked_next_power_of_two()
                .ok_or_else(|| pkts_overflow(u64::from(esit_pkts)))?
                / esit
        };

        let num = div_round_up(esit_pkts, self.pkts) as usize;
        self.repeat = num > 1;
        self.bw_cost_per_slot = maxpkt.saturating_mul(self.pkts);

        self.budget_table = alloc_table(num)?;
        let full_slots = num - 1;
        for bw in &mut self.budget_table[..full_slots] {
            *bw = self.bw_cost_per_slot;
        }
        // last slot carries what is left of the interval payload
        let payload = maxpkt.saturating_mul(esit_pkts);
        self.budget_table[full_slots] =
            payload.saturating_sub(self.bw_cost_per_slot.saturating_mul(full_slots as u32));
        Ok(())
    }

    fn setup_split(&mut self, ep: &EndpointDescriptor) -> Result<(), SchedError> {
        let maxpkt = ep.max_packet_size;
        self.pkts = 1;
        self.cs_count = div_round_up(maxpkt, FS_PAYLOAD_MAX);
        self.bw_cost_per_slot = maxpkt.min(FS_PAYLOAD_MAX);

        let num = self.cs_count as usize + 2;
        if num > TT_MICROFRAMES_MAX {
            return Err(SchedError::FieldOverflow {
                field: "cs_count",
                value: u64::from(self.cs_count),
            });
        }
        self.budget_table = alloc_table(num)?;
        let cost = self.bw_cost_per_slot;

        match (ep.transfer_type, ep.is_in()) {
            (TransferType::Isochronous, false) => self.budget_table.fill(cost),
            // only the start-split carries data
            (TransferType::Interrupt, false) => self.budget_table[0] = cost,
            // start-split and idle slot carry nothing
            _ => self.budget_table[2..].fill(cost),
        }
        Ok(())
    }
}

/// Service interval in slots for an interval exponent, clamped to
/// `ESIT_MAX`.
pub fn esit_slots(interval: u32) -> usize {
    if interval >= ESIT_MAX.trailing_zeros() {
        ESIT_MAX
    } else {
        1 << interval
    }
}

fn pkts_overflow(value: u64) -> SchedError {
    SchedError::FieldOverflow {
        field: "pkts",
        value,
    }
}

fn div_round_up(n: u32, d: u32) -> u32 {
    if d == 0 { 0 } else { n.div_ceil(d) }
}

fn alloc_table(len: usize) -> Result<Vec<u32>, SchedError> {
    let mut table = Vec::new();
    table
        .try_reserve_exact(len)
        .map_err(|_| SchedError::AllocationFailure)?;
    table.resize(len, 0);
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(speed: UsbSpeed, ep: EndpointDescriptor) -> SchedEntry {
        let dev = DeviceContext::new(1, speed, 1).behind_tt();
        SchedEntry::build(&dev, &ep).unwrap()
    }

    #[test]
    fn test_esit_clamp() {
        assert_eq!(esit_slots(0), 1);
        assert_eq!(esit_slots(3), 8);
        assert_eq!(esit_slots(6), 64);
        assert_eq!(esit_slots(15), ESIT_MAX);
        assert_eq!(esit_slots(40), ESIT_MAX);
    }

    #[test]
    fn test_high_speed_interrupt() {
        let entry = build(
            UsbSpeed::High,
            EndpointDescriptor::new(0x81, TransferType::Interrupt, 64, 3),
        );
        assert_eq!(entry.pkts, 1);
        assert_eq!(entry.num_budget_slots(), 1);
        assert_eq!(entry.budget_table, vec![64]);
        assert_eq!(entry.cs_count, 0);
        assert!(!entry.burst_mode);
        assert_eq!(entry.esit, 8);
    }

    #[test]
    fn test_high_speed_isoc_with_burst() {
        let entry = build(
            UsbSpeed::High,
            EndpointDescriptor::new(0x82, TransferType::Isochronous, 1024, 0).with_burst(2, 0),
        );
        assert_eq!(entry.pkts, 3);
        assert_eq!(entry.budget_table, vec![3072]);
    }

    #[test]
    fn test_super_speed_isoc_remainder() {
        let ep = EndpointDescriptor::new(0x83, TransferType::Isochronous, 1024, 1)
            .with_esit_payload(3 * 1024);
        let entry = build(UsbSpeed::Super, ep);
        assert_eq!(entry.esit, 2);
        assert_eq!(entry.pkts, 2);
        assert_eq!(entry.num_budget_slots(), 2);
        assert_eq!(entry.budget_table, vec![2048, 1024]);
        assert_eq!(entry.bytes_per_interval(), 3072);
        assert!(entry.repeat);
        assert!(entry.burst_mode);
    }

    #[test]
    fn test_super_speed_isoc_sum_is_exact() {
        // payloads that do not divide evenly into the per-slot cost
        for &(interval, maxp, payload) in &[
            (1u32, 1024u32, 5 * 1024u32),
            (2, 1024, 7 * 1024),
            (3, 512, 9 * 512 + 100),
            (4, 1024, 48 * 1024),
            (1, 1024, 4 * 1024),
        ] {
            let ep = EndpointDescriptor::new(0x01, TransferType::Isochronous, maxp, interval)
                .with_esit_payload(payload);
            let entry = build(UsbSpeed::Super, ep);
            let esit_pkts = payload.div_ceil(maxp);
            assert_eq!(entry.bytes_per_interval(), u64::from(maxp * esit_pkts));
            assert!(entry.num_budget_slots() <= entry.esit);
            let last = *entry.budget_table.last().unwrap();
            assert!(last > 0 && last <= entry.bw_cost_per_slot);
        }
    }

    #[test]
    fn test_super_speed_isoc_spread_one_packet_per_slot() {
        let ep = EndpointDescriptor::new(0x84, TransferType::Isochronous, 1024, 3)
            .with_esit_payload(3 * 1024);
        let entry = build(UsbSpeed::Super, ep);
        assert_eq!(entry.esit, 8);
        assert_eq!(entry.pkts, 1);
        assert_eq!(entry.budget_table, vec![1024, 1024, 1024]);
    }

    #[test]
    fn test_super_speed_zero_payload_falls_back_to_burst() {
        let ep = EndpointDescriptor::new(0x85, TransferType::Interrupt, 1024, 0).with_burst(1, 0);
        let entry = build(UsbSpeed::Super, ep);
        assert_eq!(entry.pkts, 2);
        assert_eq!(entry.budget_table, vec![2048]);

        let ep = EndpointDescriptor::new(0x86, TransferType::Isochronous, 1024, 0).with_burst(1, 2);
        let entry = build(UsbSpeed::Super, ep);
        assert_eq!(entry.pkts, 6);
        assert_eq!(entry.budget_table, vec![6144]);
        assert!(!entry.repeat);
    }

    #[test]
    fn test_full_speed_isoc_out() {
        let entry = build(
            UsbSpeed::Full,
            EndpointDescriptor::new(0x01, TransferType::Isochronous, 300, 3),
        );
        assert_eq!(entry.cs_count, 2);
        assert_eq!(entry.num_budget_slots(), 4);
        assert_eq!(entry.budget_table, vec![188, 188, 188, 188]);
    }

    #[test]
    fn test_full_speed_interrupt_out_only_start_split() {
        let entry = build(
            UsbSpeed::Full,
            EndpointDescriptor::new(0x02, TransferType::Interrupt, 64, 3),
        );
        assert_eq!(entry.cs_count, 1);
        assert_eq!(entry.budget_table, vec![64, 0, 0]);
    }

    #[test]
    fn test_low_speed_in_skips_split_and_idle() {
        let entry = build(
            UsbSpeed::Low,
            EndpointDescriptor::new(0x81, TransferType::Interrupt, 8, 3),
        );
        assert_eq!(entry.budget_table, vec![0, 0, 8]);

        let entry = build(
            UsbSpeed::Full,
            EndpointDescriptor::new(0x82, TransferType::Isochronous, 1023, 3),
        );
        assert_eq!(entry.cs_count, 6);
        assert_eq!(entry.num_budget_slots(), 8);
        assert_eq!(entry.budget_table[..2], [0, 0]);
        assert!(entry.budget_table[2..].iter().all(|&bw| bw == 188));
    }

    #[test]
    fn test_bulk_is_rejected() {
        let dev = DeviceContext::new(1, UsbSpeed::High, 1);
        let ep = EndpointDescriptor::new(0x02, TransferType::Bulk, 512, 0);
        assert!(matches!(
            SchedEntry::build(&dev, &ep),
            Err(SchedError::NotPeriodic { .. })
        ));
    }

    #[test]
    fn test_split_longer_than_tt_window_is_rejected() {
        let dev = DeviceContext::new(1, UsbSpeed::Full, 1).behind_tt();
        let ep = EndpointDescriptor::new(0x01, TransferType::Isochronous, 188 * 8, 3);
        assert_eq!(
            SchedEntry::build(&dev, &ep),
            Err(SchedError::FieldOverflow {
                field: "cs_count",
                value: 8
            })
        );
    }

    #[test]
    fn test_oversized_packet_count_is_rejected() {
        let dev = DeviceContext::new(1, UsbSpeed::Super, 1);
        let ep = EndpointDescriptor::new(0x81, TransferType::Interrupt, 8, 0)
            .with_esit_payload(8 * 64);
        assert!(matches!(
            SchedEntry::build(&dev, &ep),
            Err(SchedError::FieldOverflow { field: "pkts", .. })
        ));
    }

    #[test]
    fn test_burst_at_type_limit_is_rejected() {
        let dev = DeviceContext::new(1, UsbSpeed::High, 1);
        let ep = EndpointDescriptor::new(0x81, TransferType::Interrupt, 64, 3)
            .with_burst(u32::MAX, 0);
        assert_eq!(
            SchedEntry::build(&dev, &ep),
            Err(SchedError::FieldOverflow {
                field: "pkts",
                value: 1 << 32
            })
        );
    }

    #[test]
    fn test_mult_at_type_limit_is_rejected() {
        let dev = DeviceContext::new(1, UsbSpeed::Super, 1);
        let ep = EndpointDescriptor::new(0x81, TransferType::Isochronous, 1024, 3)
            .with_burst(0, u32::MAX);
        assert_eq!(
            SchedEntry::build(&dev, &ep),
            Err(SchedError::FieldOverflow {
                field: "pkts",
                value: 1 << 32
            })
        );

        let ep = ep.with_burst(u32::MAX, u32::MAX);
        assert!(matches!(
            SchedEntry::build(&dev, &ep),
            Err(SchedError::FieldOverflow { field: "pkts", .. })
        ));
    }

    #[test]
    fn test_payload_at_type_limit_is_rejected() {
        let dev = DeviceContext::new(1, UsbSpeed::Super, 1);
        let ep = EndpointDescriptor::new(0x81, TransferType::Isochronous, 1, 1)
            .with_esit_payload(u32::MAX);
        assert_eq!(
            SchedEntry::build(&dev, &ep),
            Err(SchedError::FieldOverflow {
                field: "pkts",
                value: u64::from(u32::MAX)
            })
        );
    }
}
