//! Endpoint add/drop against the controller's bandwidth domains.

use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, warn};

use super::SchedError;
use super::budget::SchedEntry;
use super::domain::BandwidthDomain;
use super::params::EncodedScheduleParams;
use super::selector::DomainLayout;
use crate::model::{DeviceContext, EndpointDescriptor, EndpointId, TransferType, UsbSpeed};

/// Whether an endpoint goes through the bandwidth scheduler at all.
///
/// Control and bulk endpoints are never scheduled. Low/full speed periodic
/// endpoints of a device that is not behind a TT are scheduled by the root
/// hub directly.
pub fn need_bw_sch(transfer_type: TransferType, speed: UsbSpeed, has_tt: bool) -> bool {
    if !transfer_type.is_periodic() {
        return false;
    }
    !(speed.is_full_or_low() && !has_tt)
}

/// Bandwidth domains of one host controller.
///
/// Each domain sits behind its own lock; an add or drop holds it for the
/// whole search-and-commit so no caller sees a half-applied update.
#[derive(Debug)]
pub struct Scheduler {
    layout: DomainLayout,
    domains: Vec<Mutex<BandwidthDomain>>,
}

impl Scheduler {
    /// Allocate one empty domain per entry of `layout`.
    pub fn init(layout: DomainLayout) -> Result<Self, SchedError> {
        let count = layout.domain_count();
        let mut domains = Vec::new();
        domains
            .try_reserve_exact(count)
            .map_err(|_| SchedError::AllocationFailure)?;
        domains.extend((0..count).map(|_| Mutex::new(BandwidthDomain::new())));

        debug!(
            "scheduler: {} USB3 ports, {} USB2 ports, {} domains",
            layout.usb3_ports, layout.usb2_ports, count
        );
        Ok(Self { layout, domains })
    }

    /// Release every domain. Returns the number of endpoints that were
    /// still scheduled.
    pub fn teardown(self) -> usize {
        let mut released = 0;
        for domain in self.domains {
            let mut domain = domain.into_inner().unwrap_or_else(PoisonError::into_inner);
            released += domain.clear();
        }
        debug!("scheduler: torn down, {} endpoints released", released);
        released
    }

    pub fn layout(&self) -> DomainLayout {
        self.layout
    }

    pub fn domain_count(&self) -> usize {
        self.domains.len()
    }

    /// Copy of one domain.
    pub fn domain(&self, index: usize) -> Option<BandwidthDomain> {
        self.domains
            .get(index)
            .map(|d| d.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    /// Copy of every domain, in index order.
    pub fn snapshot(&self) -> Vec<BandwidthDomain> {
        (0..self.domains.len()).filter_map(|i| self.domain(i)).collect()
    }

    /// Schedule a periodic endpoint.
    ///
    /// Endpoints that bypass the scheduler get their fixed encoding back
    /// without touching any domain. On error nothing is reserved.
    pub fn add_endpoint(
        &self,
        device: &DeviceContext,
        ep: &EndpointDescriptor,
    ) -> Result<EncodedScheduleParams, SchedError> {
        debug!(
            "add_endpoint type:{} speed:{:?} mpkt:{} dir:{} ep:{:#04x} slot:{}",
            ep.transfer_type, device.speed, ep.max_packet_size, ep.direction, ep.address,
            device.slot_id
        );

        if !need_bw_sch(ep.transfer_type, device.speed, device.has_tt) {
            if ep.transfer_type.is_periodic() {
                return Ok(EncodedScheduleParams::single_packet());
            }
            return Ok(EncodedScheduleParams::default());
        }

        let mut domain = self.lock_domain(device, ep)?;
        if domain.contains(endpoint_id(device, ep)) {
            return Err(SchedError::AlreadyScheduled {
                slot: device.slot_id,
                address: ep.address,
            });
        }

        let entry = SchedEntry::build(device, ep)?;
        let boundary = device.speed.bw_boundary();
        let entry = domain.admit(entry, boundary).inspect_err(|e| {
            warn!("slot {} EP{:02X}: {}", device.slot_id, ep.address, e);
        })?;

        let params = EncodedScheduleParams::from_entry(entry);
        debug!(
            " PKTS:{:x}, CSCOUNT:{:x}, BM:{:x}, OFFSET:{:x}, REPEAT:{:x}",
            params.pkts,
            params.cs_count,
            u8::from(params.burst_mode),
            params.offset,
            params.repeat
        );
        Ok(params)
    }

    /// Release the bandwidth of an endpoint and return the cleared encoding
    /// for its context. Dropping an endpoint that was never scheduled only
    /// returns the cleared encoding.
    pub fn drop_endpoint(
        &self,
        device: &DeviceContext,
        ep: &EndpointDescriptor,
    ) -> EncodedScheduleParams {
        debug!(
            "drop_endpoint type:{} speed:{:?} mpkt:{} dir:{} ep:{:#04x} slot:{}",
            ep.transfer_type, device.speed, ep.max_packet_size, ep.direction, ep.address,
            device.slot_id
        );

        if !need_bw_sch(ep.transfer_type, device.speed, device.has_tt) {
            return EncodedScheduleParams::default();
        }

        match self.lock_domain(device, ep) {
            Ok(mut domain) => {
                if domain.release(endpoint_id(device, ep)).is_none() {
                    debug!("drop_endpoint: EP{:02X} was not scheduled", ep.address);
                }
            }
            Err(e) => warn!("drop_endpoint: {}", e),
        }
        EncodedScheduleParams::default()
    }

    fn lock_domain(
        &self,
        device: &DeviceContext,
        ep: &EndpointDescriptor,
    ) -> Result<MutexGuard<'_, BandwidthDomain>, SchedError> {
        let index = self
            .layout
            .domain_index(device.real_port, device.speed, ep.direction)
            .ok_or(SchedError::PortOutOfRange {
                port: device.real_port,
            })?;
        let domain = self.domains.get(index).ok_or(SchedError::PortOutOfRange {
            port: device.real_port,
        })?;
        Ok(domain.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

fn endpoint_id(device: &DeviceContext, ep: &EndpointDescriptor) -> EndpointId {
    EndpointId {
        slot_id: device.slot_id,
        address: ep.address,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SS_BW_BOUNDARY;
    use std::sync::Arc;
    use std::thread;

    fn scheduler() -> Scheduler {
        Scheduler::init(DomainLayout::new(2, 2)).unwrap()
    }

    #[test]
    fn test_need_bw_sch() {
        assert!(!need_bw_sch(TransferType::Bulk, UsbSpeed::High, false));
        assert!(!need_bw_sch(TransferType::Control, UsbSpeed::Super, false));
        assert!(!need_bw_sch(TransferType::Interrupt, UsbSpeed::Full, false));
        assert!(need_bw_sch(TransferType::Interrupt, UsbSpeed::Full, true));
        assert!(need_bw_sch(TransferType::Isochronous, UsbSpeed::High, false));
        assert!(need_bw_sch(TransferType::Isochronous, UsbSpeed::Super, false));
    }

    #[test]
    fn test_init_domain_count() {
        assert_eq!(scheduler().domain_count(), 6);
        assert_eq!(Scheduler::init(DomainLayout::default()).unwrap().domain_count(), 0);
    }

    #[test]
    fn test_root_hub_scheduled_endpoint_gets_single_packet() {
        let sch = scheduler();
        let dev = DeviceContext::new(1, UsbSpeed::Full, 3);
        let ep = EndpointDescriptor::new(0x81, TransferType::Interrupt, 8, 3);
        let params = sch.add_endpoint(&dev, &ep).unwrap();
        assert_eq!(params, EncodedScheduleParams::single_packet());
        assert!(sch.snapshot().iter().all(|d| d.members().is_empty()));

        let bulk = EndpointDescriptor::new(0x02, TransferType::Bulk, 512, 0);
        let hs = DeviceContext::new(2, UsbSpeed::High, 3);
        assert_eq!(sch.add_endpoint(&hs, &bulk).unwrap(), EncodedScheduleParams::default());
    }

    #[test]
    fn test_add_high_speed_interrupt() {
        let sch = scheduler();
        let dev = DeviceContext::new(1, UsbSpeed::High, 3);
        let ep = EndpointDescriptor::new(0x81, TransferType::Interrupt, 64, 3);
        let params = sch.add_endpoint(&dev, &ep).unwrap();
        assert_eq!(params.pkts, 1);
        assert_eq!(params.offset, 0);
        assert_eq!(params.cs_count, 0);
        assert!(!params.burst_mode);

        // HS port 0 is domain 4
        let domain = sch.domain(4).unwrap();
        assert_eq!(domain.members().len(), 1);
        assert_eq!(domain.slots()[0], 64);
    }

    #[test]
    fn test_superspeed_directions_use_separate_domains() {
        let sch = scheduler();
        let dev = DeviceContext::new(1, UsbSpeed::Super, 2);
        let ep_in = EndpointDescriptor::new(0x81, TransferType::Isochronous, 1024, 0)
            .with_burst(15, 2);
        let ep_out = EndpointDescriptor::new(0x01, TransferType::Isochronous, 1024, 0)
            .with_burst(15, 2);

        // 48 KiB per slot each, only one fits a domain
        sch.add_endpoint(&dev, &ep_in).unwrap();
        sch.add_endpoint(&dev, &ep_out).unwrap();
        assert_eq!(sch.domain(2).unwrap().members().len(), 1);
        assert_eq!(sch.domain(3).unwrap().members().len(), 1);
        assert_eq!(sch.domain(2).unwrap().members()[0].id.address, 0x01);

        let another = EndpointDescriptor::new(0x82, TransferType::Isochronous, 1024, 0)
            .with_burst(15, 2);
        let err = sch.add_endpoint(&dev, &another).unwrap_err();
        assert_eq!(
            err,
            SchedError::CapacityExceeded {
                worst_bw: 2 * 48 * 1024,
                boundary: SS_BW_BOUNDARY
            }
        );
        assert_eq!(sch.domain(3).unwrap().members().len(), 1);
    }

    #[test]
    fn test_add_then_drop_restores_domain() {
        let sch = scheduler();
        let hub_child = DeviceContext::new(4, UsbSpeed::Full, 4).behind_tt();
        let hs = DeviceContext::new(5, UsbSpeed::High, 4);
        sch.add_endpoint(&hs, &EndpointDescriptor::new(0x81, TransferType::Isochronous, 1024, 2))
            .unwrap();
        let before = sch.domain(5).unwrap();

        let ep = EndpointDescriptor::new(0x01, TransferType::Isochronous, 300, 3);
        let params = sch.add_endpoint(&hub_child, &ep).unwrap();
        assert_eq!(params.cs_count, 2);
        assert_ne!(sch.domain(5).unwrap(), before);

        let cleared = sch.drop_endpoint(&hub_child, &ep);
        assert_eq!(cleared, EncodedScheduleParams::default());
        assert_eq!(cleared.context_words(), [0, 0]);
        assert_eq!(sch.domain(5).unwrap(), before);
    }

    #[test]
    fn test_drop_of_bypassed_endpoint_clears_encoding() {
        let sch = scheduler();
        let root_fs = DeviceContext::new(6, UsbSpeed::Full, 3);
        let ep = EndpointDescriptor::new(0x81, TransferType::Interrupt, 8, 3);
        assert_eq!(
            sch.add_endpoint(&root_fs, &ep).unwrap(),
            EncodedScheduleParams::single_packet()
        );
        assert_eq!(
            sch.drop_endpoint(&root_fs, &ep),
            EncodedScheduleParams::default()
        );
    }

    #[test]
    fn test_drop_unknown_endpoint_is_noop() {
        let sch = scheduler();
        let dev = DeviceContext::new(1, UsbSpeed::High, 3);
        let ep = EndpointDescriptor::new(0x81, TransferType::Interrupt, 64, 3);
        sch.drop_endpoint(&dev, &ep);
        sch.drop_endpoint(&DeviceContext::new(1, UsbSpeed::High, 99), &ep);
        assert!(sch.snapshot().iter().all(|d| d == &BandwidthDomain::new()));
    }

    #[test]
    fn test_duplicate_add_is_rejected() {
        let sch = scheduler();
        let dev = DeviceContext::new(1, UsbSpeed::High, 3);
        let ep = EndpointDescriptor::new(0x81, TransferType::Interrupt, 64, 3);
        sch.add_endpoint(&dev, &ep).unwrap();
        let before = sch.domain(4).unwrap();
        assert_eq!(
            sch.add_endpoint(&dev, &ep),
            Err(SchedError::AlreadyScheduled {
                slot: 1,
                address: 0x81
            })
        );
        assert_eq!(sch.domain(4).unwrap(), before);
    }

    #[test]
    fn test_port_out_of_range() {
        let sch = scheduler();
        let dev = DeviceContext::new(1, UsbSpeed::Super, 7);
        let ep = EndpointDescriptor::new(0x81, TransferType::Interrupt, 64, 3);
        assert_eq!(
            sch.add_endpoint(&dev, &ep),
            Err(SchedError::PortOutOfRange { port: 7 })
        );
    }

    #[test]
    fn test_teardown_counts_members() {
        let sch = scheduler();
        let dev = DeviceContext::new(1, UsbSpeed::High, 3);
        for address in [0x81, 0x82, 0x03] {
            let ep = EndpointDescriptor::new(address, TransferType::Interrupt, 64, 3);
            sch.add_endpoint(&dev, &ep).unwrap();
        }
        assert_eq!(sch.teardown(), 3);
    }

    #[test]
    fn test_concurrent_adds_share_domain_consistently() {
        let sch = Arc::new(scheduler());
        let handles: Vec<_> = (0..8u8)
            .map(|slot| {
                let sch = Arc::clone(&sch);
                thread::spawn(move || {
                    let dev = DeviceContext::new(slot + 1, UsbSpeed::High, 3);
                    let ep = EndpointDescriptor::new(0x81, TransferType::Interrupt, 512, 3);
                    sch.add_endpoint(&dev, &ep).unwrap()
                })
            })
            .collect();
        let mut offsets: Vec<u16> = handles.into_iter().map(|h| h.join().unwrap().offset).collect();
        offsets.sort_unstable();
        // every offset of the 8-slot interval taken exactly once
        assert_eq!(offsets, (0..8).collect::<Vec<u16>>());

        let domain = sch.domain(4).unwrap();
        assert!(domain.slots().iter().all(|&bw| bw == 512));
    }
}
