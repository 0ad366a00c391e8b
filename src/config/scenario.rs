//! Scenario entries: devices and endpoint add/drop steps.

use crate::config::{Config, ConfigError};
use crate::model::{DeviceContext, Direction, EndpointDescriptor, TransferType, UsbSpeed};
use crate::sched::{EncodedScheduleParams, SchedError, Scheduler};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;

/// A device attached to the controller.
#[derive(Debug, Deserialize, Clone)]
pub struct DeviceSpec {
    /// xHCI slot id.
    pub slot: u8,
    /// "low", "full", "high" or "super".
    pub speed: String,
    /// Root port number (1-based, USB3 ports first).
    pub port: u8,
    /// Attached through a high-speed hub's TT.
    #[serde(default)]
    pub tt: bool,
    /// Optional label for output.
    #[serde(default)]
    pub name: Option<String>,
}

impl DeviceSpec {
    pub fn context(&self) -> Result<DeviceContext, ConfigError> {
        let speed = UsbSpeed::from_name(&self.speed).ok_or_else(|| {
            ConfigError::Invalid(format!("slot {}: unknown speed '{}'", self.slot, self.speed))
        })?;
        Ok(DeviceContext {
            slot_id: self.slot,
            speed,
            real_port: self.port,
            has_tt: self.tt,
        })
    }
}

/// What a step does.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[default]
    Add,
    Drop,
}

/// One add or drop request.
#[derive(Debug, Deserialize, Clone)]
pub struct StepSpec {
    #[serde(default)]
    pub action: Action,
    pub slot: u8,
    pub address: u8,
    /// Transfer type; a drop may leave it out to reuse the added endpoint.
    #[serde(rename = "type")]
    pub transfer_type: Option<String>,
    /// Defaults to bit 7 of the address.
    pub direction: Option<String>,
    #[serde(default)]
    pub max_packet_size: u32,
    #[serde(default)]
    pub max_burst: u32,
    #[serde(default)]
    pub mult: u32,
    #[serde(default)]
    pub interval: u32,
    #[serde(default)]
    pub max_esit_payload: u32,
}

impl StepSpec {
    /// Endpoint described by this step, if it names a transfer type.
    pub fn endpoint(&self) -> Result<Option<EndpointDescriptor>, ConfigError> {
        let Some(name) = &self.transfer_type else {
            return Ok(None);
        };
        let transfer_type = TransferType::from_name(name).ok_or_else(|| {
            ConfigError::Invalid(format!("EP{:02X}: unknown transfer type '{}'", self.address, name))
        })?;
        let direction = match &self.direction {
            Some(d) => Direction::from_name(d).ok_or_else(|| {
                ConfigError::Invalid(format!("EP{:02X}: unknown direction '{}'", self.address, d))
            })?,
            None => Direction::from_address(self.address),
        };
        Ok(Some(EndpointDescriptor {
            address: self.address,
            transfer_type,
            direction,
            max_packet_size: self.max_packet_size,
            max_burst: self.max_burst,
            mult: self.mult,
            interval: self.interval,
            max_esit_payload: self.max_esit_payload,
        }))
    }
}

/// Result of replaying one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Added(EncodedScheduleParams),
    Rejected(SchedError),
    Dropped,
}

/// A replayed step with the resolved device and endpoint.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub action: Action,
    pub device: DeviceContext,
    pub endpoint: EndpointDescriptor,
    pub outcome: Outcome,
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let action = match self.action {
            Action::Add => "add ",
            Action::Drop => "drop",
        };
        write!(
            f,
            "{} slot{} {} ({}",
            action,
            self.device.slot_id,
            self.endpoint,
            self.device.speed.short_name()
        )?;
        if self.device.has_tt {
            write!(f, ", TT")?;
        }
        write!(f, ") -> ")?;
        match &self.outcome {
            Outcome::Added(p) => {
                let [word0, word1] = p.context_words();
                write!(
                    f,
                    "pkts={} cs={} bm={} offset={} repeat={} [{:#010x} {:#010x}]",
                    p.pkts,
                    p.cs_count,
                    u8::from(p.burst_mode),
                    p.offset,
                    p.repeat,
                    word0,
                    word1
                )
            }
            Outcome::Rejected(e) => write!(f, "rejected: {}", e),
            Outcome::Dropped => write!(f, "released"),
        }
    }
}

/// Replay the configured steps against `scheduler`.
///
/// Scheduling rejections are part of the outcome; malformed steps are
/// configuration errors and stop the replay.
pub fn replay(config: &Config, scheduler: &Scheduler) -> Result<Vec<StepOutcome>, ConfigError> {
    let mut added: HashMap<(u8, u8), EndpointDescriptor> = HashMap::new();
    let mut outcomes = Vec::with_capacity(config.steps.len());

    for step in &config.steps {
        let device = config
            .device(step.slot)
            .ok_or_else(|| ConfigError::Invalid(format!("no device in slot {}", step.slot)))?
            .context()?;

        let endpoint = match (step.endpoint()?, added.get(&(step.slot, step.address))) {
            (Some(ep), _) => ep,
            (None, Some(ep)) if step.action == Action::Drop => ep.clone(),
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "slot {} EP{:02X}: missing transfer type",
                    step.slot, step.address
                )));
            }
        };

        let outcome = match step.action {
            Action::Add => match scheduler.add_endpoint(&device, &endpoint) {
                Ok(params) => {
                    added.insert((step.slot, step.address), endpoint.clone());
                    Outcome::Added(params)
                }
                Err(e) => Outcome::Rejected(e),
            },
            Action::Drop => {
                scheduler.drop_endpoint(&device, &endpoint);
                added.remove(&(step.slot, step.address));
                Outcome::Dropped
            }
        };

        outcomes.push(StepOutcome {
            action: step.action,
            device,
            endpoint,
            outcome,
        });
    }

    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::example_config;
    use crate::sched::BandwidthDomain;

    #[test]
    fn test_replay_example() {
        let config = Config::from_toml(example_config()).unwrap();
        let sch = Scheduler::init(config.layout()).unwrap();
        let outcomes = replay(&config, &sch).unwrap();
        assert_eq!(outcomes.len(), 3);

        let Outcome::Added(params) = &outcomes[0].outcome else {
            panic!("expected add, got {:?}", outcomes[0].outcome);
        };
        assert_eq!(params.pkts, 2);
        assert_eq!(params.repeat, 1);
        assert!(params.burst_mode);

        let Outcome::Added(params) = &outcomes[1].outcome else {
            panic!("expected add, got {:?}", outcomes[1].outcome);
        };
        assert_eq!(params.cs_count, 2);
        assert_eq!(outcomes[2].outcome, Outcome::Dropped);
        assert_eq!(outcomes[2].endpoint.max_packet_size, 300);

        // the full-speed endpoint was dropped again, leaving HS port 0 empty
        assert_eq!(sch.domain(2).unwrap(), BandwidthDomain::new());
        assert_eq!(sch.domain(1).unwrap().members().len(), 1);
    }

    #[test]
    fn test_rejection_is_an_outcome() {
        let toml = r#"
[controller]
usb3_ports = 0
usb2_ports = 1

[[devices]]
slot = 1
speed = "high"
port = 1

[[steps]]
slot = 1
address = 0x81
type = "isoc"
max_packet_size = 1024
max_burst = 2

[[steps]]
slot = 1
address = 0x82
type = "isoc"
max_packet_size = 1024
max_burst = 2

[[steps]]
slot = 1
address = 0x83
type = "isoc"
max_packet_size = 1024
max_burst = 2
"#;
        let config = Config::from_toml(toml).unwrap();
        let sch = Scheduler::init(config.layout()).unwrap();
        let outcomes = replay(&config, &sch).unwrap();
        assert!(matches!(outcomes[0].outcome, Outcome::Added(_)));
        assert!(matches!(outcomes[1].outcome, Outcome::Added(_)));
        assert_eq!(
            outcomes[2].outcome,
            Outcome::Rejected(SchedError::CapacityExceeded {
                worst_bw: 9216,
                boundary: 6144
            })
        );
    }

    #[test]
    fn test_overflowing_burst_is_rejected() {
        let toml = r#"
[controller]
usb3_ports = 0
usb2_ports = 1

[[devices]]
slot = 1
speed = "high"
port = 1

[[steps]]
slot = 1
address = 0x81
type = "int"
max_packet_size = 64
max_burst = 4294967295
"#;
        let config = Config::from_toml(toml).unwrap();
        let sch = Scheduler::init(config.layout()).unwrap();
        let outcomes = replay(&config, &sch).unwrap();
        assert!(matches!(
            outcomes[0].outcome,
            Outcome::Rejected(SchedError::FieldOverflow { field: "pkts", .. })
        ));
        assert_eq!(sch.domain(0).unwrap(), BandwidthDomain::new());
    }

    #[test]
    fn test_unknown_device_is_config_error() {
        let toml = "[[steps]]\nslot = 9\naddress = 0x81\ntype = \"int\"\n";
        let config = Config::from_toml(toml).unwrap();
        let sch = Scheduler::init(config.layout()).unwrap();
        assert!(matches!(replay(&config, &sch), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_outcome_display() {
        let outcome = StepOutcome {
            action: Action::Add,
            device: DeviceContext::new(1, UsbSpeed::High, 1),
            endpoint: EndpointDescriptor::new(0x81, TransferType::Interrupt, 64, 3),
            outcome: Outcome::Added(EncodedScheduleParams::single_packet()),
        };
        assert_eq!(
            outcome.to_string(),
            "add  slot1 EP81 Interrupt IN 64B @ 2^3 (480M) -> \
             pkts=1 cs=0 bm=0 offset=0 repeat=0 [0x00000001 0x00000000]"
        );
    }

    #[test]
    fn test_bad_speed_is_config_error() {
        let spec = DeviceSpec {
            slot: 1,
            speed: "warp".to_string(),
            port: 1,
            tt: false,
            name: None,
        };
        assert!(spec.context().is_err());
    }
}
