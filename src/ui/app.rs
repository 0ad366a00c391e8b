//! TUI application state.

use crate::config::StepOutcome;
use crate::model::{HS_BW_BOUNDARY, SS_BW_BOUNDARY, SlotUsage};
use crate::sched::{BandwidthDomain, DomainLayout, Scheduler};

/// View mode for the TUI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewMode {
    /// Domain list with per-slot detail.
    #[default]
    Domains,
    /// Replayed add/drop steps.
    Steps,
}

/// One row of the domain list.
#[derive(Debug, Clone)]
pub struct DomainItem {
    pub index: usize,
    pub label: String,
    pub superspeed: bool,
    pub usage: SlotUsage,
    pub members: usize,
}

/// TUI application state.
pub struct App {
    /// Domain layout of the controller.
    pub layout: DomainLayout,
    /// Domain contents at startup.
    pub domains: Vec<BandwidthDomain>,
    /// Replayed steps, in order.
    pub steps: Vec<String>,
    /// Current view mode.
    pub view_mode: ViewMode,
    /// Currently selected row.
    pub selected: usize,
    /// Show help overlay.
    pub show_help: bool,
    /// Show inline bandwidth bars in the domain list.
    pub show_bandwidth_bars: bool,
    /// Width of bandwidth bars.
    pub bar_width: usize,
    /// Scroll offset of the detail pane.
    pub detail_scroll: u16,
}

impl App {
    /// Create a new app from a scheduler and the steps replayed on it.
    pub fn new(scheduler: &Scheduler, outcomes: &[StepOutcome], bar_width: usize) -> Self {
        Self {
            layout: scheduler.layout(),
            domains: scheduler.snapshot(),
            steps: outcomes.iter().map(|o| o.to_string()).collect(),
            view_mode: ViewMode::Domains,
            selected: 0,
            show_help: false,
            show_bandwidth_bars: true,
            bar_width,
            detail_scroll: 0,
        }
    }

    /// Boundary that applies to domain `index`.
    pub fn boundary(&self, index: usize) -> u32 {
        if self.is_superspeed(index) {
            SS_BW_BOUNDARY
        } else {
            HS_BW_BOUNDARY
        }
    }

    fn is_superspeed(&self, index: usize) -> bool {
        index < usize::from(self.layout.usb3_ports) * 2
    }

    /// Rows of the domain list.
    pub fn domain_items(&self) -> Vec<DomainItem> {
        self.domains
            .iter()
            .enumerate()
            .map(|(index, domain)| DomainItem {
                index,
                label: self.layout.describe(index),
                superspeed: self.is_superspeed(index),
                usage: domain.usage(self.boundary(index)),
                members: domain.members().len(),
            })
            .collect()
    }

    /// Number of rows in the current view.
    fn row_count(&self) -> usize {
        match self.view_mode {
            ViewMode::Domains => self.domains.len(),
            ViewMode::Steps => self.steps.len(),
        }
    }

    /// Move selection up/down.
    pub fn move_selection(&mut self, delta: i32) {
        let len = self.row_count();
        if len == 0 {
            return;
        }

        self.selected = if delta < 0 {
            self.selected.saturating_sub(delta.unsigned_abs() as usize)
        } else {
            (self.selected + delta as usize).min(len - 1)
        };
        self.detail_scroll = 0;
    }

    /// Jump to top.
    pub fn goto_top(&mut self) {
        self.selected = 0;
        self.detail_scroll = 0;
    }

    /// Jump to bottom.
    pub fn goto_bottom(&mut self) {
        self.selected = self.row_count().saturating_sub(1);
        self.detail_scroll = 0;
    }

    /// Set view mode.
    pub fn set_view_mode(&mut self, mode: ViewMode) {
        self.view_mode = mode;
        self.selected = 0;
        self.detail_scroll = 0;
    }

    /// Toggle inline bandwidth bars.
    pub fn toggle_bandwidth_bars(&mut self) {
        self.show_bandwidth_bars = !self.show_bandwidth_bars;
    }

    /// Scroll details panel up.
    pub fn scroll_details_up(&mut self) {
        self.detail_scroll = self.detail_scroll.saturating_sub(5);
    }

    /// Scroll details panel down.
    pub fn scroll_details_down(&mut self) {
        self.detail_scroll = self.detail_scroll.saturating_add(5);
    }

    /// Domain under the cursor, when the domain list is shown.
    pub fn selected_domain(&self) -> Option<(usize, &BandwidthDomain)> {
        match self.view_mode {
            ViewMode::Domains => self.domains.get(self.selected).map(|d| (self.selected, d)),
            ViewMode::Steps => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DeviceContext, EndpointDescriptor, TransferType, UsbSpeed};

    fn app() -> App {
        let sch = Scheduler::init(DomainLayout::new(1, 2)).unwrap();
        let dev = DeviceContext::new(1, UsbSpeed::High, 2);
        sch.add_endpoint(&dev, &EndpointDescriptor::new(0x81, TransferType::Interrupt, 512, 0))
            .unwrap();
        App::new(&sch, &[], 20)
    }

    #[test]
    fn test_domain_items() {
        let app = app();
        let items = app.domain_items();
        assert_eq!(items.len(), 4);
        assert!(items[1].superspeed);
        assert_eq!(items[1].label, "SS port 0 IN");
        assert_eq!(items[2].members, 1);
        assert_eq!(items[2].usage.peak, 512);
        assert_eq!(items[2].usage.boundary, HS_BW_BOUNDARY);
        assert_eq!(items[0].usage.boundary, SS_BW_BOUNDARY);
    }

    #[test]
    fn test_selection_is_clamped() {
        let mut app = app();
        app.move_selection(-3);
        assert_eq!(app.selected, 0);
        app.move_selection(10);
        assert_eq!(app.selected, 3);
        app.goto_top();
        assert_eq!(app.selected_domain().map(|(i, _)| i), Some(0));

        app.set_view_mode(ViewMode::Steps);
        app.goto_bottom();
        assert_eq!(app.selected, 0);
        assert!(app.selected_domain().is_none());
    }
}
