//! Mapping from root ports to bandwidth domains.
//!
//! Each USB2 root port is one bandwidth domain. Each USB3 root port is two,
//! one for OUT endpoints and one for IN endpoints. The domain array is laid
//! out as:
//!
//! ```text
//! SSport0-OUT, SSport0-IN, ..., SSportX-OUT, SSportX-IN, HSport0, ..., HSportY
//! ```
//!
//! Root ports use the controller's numbering: 1 for SS port 0, ..., N for
//! SS port N-1, N+1 for HS port 0, and so on.

use crate::model::{Direction, UsbSpeed};

/// Root port counts of a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DomainLayout {
    pub usb3_ports: u8,
    pub usb2_ports: u8,
}

impl DomainLayout {
    pub fn new(usb3_ports: u8, usb2_ports: u8) -> Self {
        Self {
            usb3_ports,
            usb2_ports,
        }
    }

    /// Number of bandwidth domains; SS IN and OUT are separate.
    pub fn domain_count(&self) -> usize {
        usize::from(self.usb3_ports) * 2 + usize::from(self.usb2_ports)
    }

    /// Domain index of an endpoint, or `None` when the port is not part of
    /// this layout.
    pub fn domain_index(
        &self,
        real_port: u8,
        speed: UsbSpeed,
        direction: Direction,
    ) -> Option<usize> {
        let port = usize::from(real_port);
        let usb3 = usize::from(self.usb3_ports);

        if speed.is_superspeed() {
            if port == 0 || port > usb3 {
                return None;
            }
            let base = (port - 1) * 2;
            return Some(match direction {
                Direction::Out => base,
                Direction::In => base + 1,
            });
        }

        if port <= usb3 || port > usb3 + usize::from(self.usb2_ports) {
            return None;
        }
        // add one more for each SS port
        Some(port + usb3 - 1)
    }

    /// Human-readable name of a domain.
    pub fn describe(&self, index: usize) -> String {
        let ss_domains = usize::from(self.usb3_ports) * 2;
        if index < ss_domains {
            let dir = if index % 2 == 0 { "OUT" } else { "IN" };
            format!("SS port {} {}", index / 2, dir)
        } else {
            format!("HS port {}", index - ss_domains)
        }
    }
}
