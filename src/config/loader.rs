//! Configuration loading and management.

use crate::config::scenario::{DeviceSpec, StepSpec};
use crate::sched::DomainLayout;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Inheritance error: {0}")]
    Inheritance(String),
    #[error("Invalid value: {0}")]
    Invalid(String),
}

/// Application configuration: controller shape plus an optional scenario of
/// devices and add/drop steps to replay.
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Global settings.
    #[serde(default)]
    pub settings: Settings,

    /// Root port counts of the controller.
    #[serde(default)]
    pub controller: ControllerConfig,

    /// Devices attached to the controller.
    #[serde(default)]
    pub devices: Vec<DeviceSpec>,

    /// Endpoint add/drop requests, replayed in order.
    #[serde(default)]
    pub steps: Vec<StepSpec>,
}

/// Global settings.
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// Log filter used when RUST_LOG is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Width of the text bandwidth bars.
    #[serde(default = "default_bar_width")]
    pub bar_width: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            bar_width: default_bar_width(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_bar_width() -> usize {
    30
}

/// Root port counts.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct ControllerConfig {
    #[serde(default = "default_ports")]
    pub usb3_ports: u8,
    #[serde(default = "default_ports")]
    pub usb2_ports: u8,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            usb3_ports: default_ports(),
            usb2_ports: default_ports(),
        }
    }
}

fn default_ports() -> u8 {
    1
}

impl Config {
    /// Load configuration from default locations.
    /// Search order:
    /// 1. ./usbsch.toml
    /// 2. ~/.config/usbsch/config.toml
    /// 3. /etc/usbsch.toml
    pub fn load() -> Result<Self, ConfigError> {
        for path in Self::config_paths().into_iter().flatten() {
            if path.exists() {
                return Self::load_from_path(&path);
            }
        }

        // No config file found - use defaults
        Ok(Config::default())
    }

    /// Load configuration from a specific path, supporting inheritance.
    ///
    /// An `inherit` key (string or array of strings) names files that are
    /// loaded first; this file's values are merged on top of them.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        let merged = resolve_inherit(path, &mut seen)?;
        let config: Config = merged.try_into()?;
        Ok(config)
    }

    /// Parse a configuration from a TOML string. No inheritance.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Get list of possible config paths.
    fn config_paths() -> Vec<Option<PathBuf>> {
        vec![
            std::env::current_dir().ok().map(|p| p.join("usbsch.toml")),
            dirs::config_dir().map(|p| p.join("usbsch").join("config.toml")),
            Some(PathBuf::from("/etc/usbsch.toml")),
        ]
    }

    /// Domain layout of the configured controller.
    pub fn layout(&self) -> DomainLayout {
        DomainLayout::new(self.controller.usb3_ports, self.controller.usb2_ports)
    }

    /// Look up a device by slot id.
    pub fn device(&self, slot: u8) -> Option<&DeviceSpec> {
        self.devices.iter().find(|d| d.slot == slot)
    }
}

// =============================================================================
// TOML Inheritance Support
// =============================================================================

/// Read a TOML file, loading and merging whatever it inherits first.
///
/// Inherited paths are relative to the directory of the including file.
/// A file may appear only once in the inheritance graph.
fn resolve_inherit(path: &Path, seen: &mut HashSet<PathBuf>) -> Result<toml::Value, ConfigError> {
    let canonical = path.canonicalize().map_err(|e| {
        ConfigError::Inheritance(format!("cannot resolve {}: {}", path.display(), e))
    })?;
    if !seen.insert(canonical) {
        return Err(ConfigError::Inheritance(format!(
            "{} is inherited more than once; circular dependencies are not allowed",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path)?;
    let mut doc: toml::Value = toml::from_str(&content)?;
    let inherit = doc.as_table_mut().and_then(|t| t.remove("inherit"));
    let Some(inherit) = inherit else {
        return Ok(doc);
    };

    let base_dir = path.parent().unwrap_or(Path::new("."));
    let parents = match inherit {
        toml::Value::String(s) => vec![s],
        toml::Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                toml::Value::String(s) => Ok(s),
                _ => Err(ConfigError::Inheritance(
                    "inherit array must contain only strings".to_string(),
                )),
            })
            .collect::<Result<Vec<_>, _>>()?,
        _ => {
            return Err(ConfigError::Inheritance(
                "inherit must be a string or array of strings".to_string(),
            ));
        }
    };

    let mut merged: Option<toml::Value> = None;
    for parent in parents {
        let value = resolve_inherit(&base_dir.join(parent), seen)?;
        merged = Some(match merged {
            Some(base) => merge_values(base, value),
            None => value,
        });
    }

    Ok(match merged {
        Some(base) => merge_values(base, doc),
        None => doc,
    })
}

/// Deep-merge `overlay` onto `base`: tables merge key by key, arrays
/// concatenate, anything else is replaced.
fn merge_values(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut table), toml::Value::Table(over)) => {
            for (key, value) in over {
                let value = match table.remove(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => value,
                };
                table.insert(key, value);
            }
            toml::Value::Table(table)
        }
        (toml::Value::Array(mut items), toml::Value::Array(more)) => {
            items.extend(more);
            toml::Value::Array(items)
        }
        (_, overlay) => overlay,
    }
}

/// Generate example configuration content.
pub fn example_config() -> &'static str {
    r#"# usbsch configuration file
# Place in ./usbsch.toml, ~/.config/usbsch/config.toml, or /etc/usbsch.toml
# A file may pull in others with: inherit = ["base.toml"]

[settings]
# Log filter when RUST_LOG is unset: error, warn, info, debug, trace
log_level = "warn"
# Width of text bandwidth bars
bar_width = 30

# Root ports of the host controller. Ports are numbered from 1,
# USB3 ports first, then USB2 ports.
[controller]
usb3_ports = 1
usb2_ports = 1

# Devices: slot id, speed (low, full, high, super), root port, and
# whether the device sits behind a high-speed hub's TT.
[[devices]]
slot = 1
speed = "super"
port = 1

[[devices]]
slot = 2
speed = "full"
port = 2
tt = true

# Steps are replayed in order. action is "add" (default) or "drop".
# interval is the exponent: the endpoint is serviced every 2^interval slots.
[[steps]]
slot = 1
address = 0x81
type = "isoc"
max_packet_size = 1024
interval = 1
max_esit_payload = 3072

[[steps]]
slot = 2
address = 0x01
type = "isoc"
max_packet_size = 300
interval = 3

[[steps]]
action = "drop"
slot = 2
address = 0x01
"#
}
