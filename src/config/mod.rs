//! Configuration loading and scenario replay.

mod loader;
pub mod scenario;

pub use loader::{Config, ConfigError, ControllerConfig, Settings, example_config};
pub use scenario::{Action, DeviceSpec, Outcome, StepOutcome, StepSpec, replay};
