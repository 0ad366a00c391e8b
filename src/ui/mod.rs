//! TUI components.

pub mod app;
pub mod render;

pub use app::{App, DomainItem, ViewMode};
pub use render::render;
