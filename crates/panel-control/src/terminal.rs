//! Host capabilities rendered as lines on a terminal.  Used by the
//! `panelplay` binary, where stdin stands in for the browser chrome.

use std::io::Write;

use panel_proto::config::PanelSize;
use tracing::debug;

use crate::host::{Button, Icon, Panel, TabId, Tabs, Toolbar};

/// Writes one line per host action to `out`.
pub struct TerminalHost<W> {
    out: W,
    panel_visible: bool,
}

impl TerminalHost<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> TerminalHost<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            panel_visible: false,
        }
    }

    pub fn panel_visible(&self) -> bool {
        self.panel_visible
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: &str) {
        debug!("host: {}", text);
        if let Err(e) = writeln!(self.out, "{text}") {
            debug!("host: write failed: {}", e);
        }
    }
}

impl<W: Write> Panel for TerminalHost<W> {
    fn show(&mut self, anchor: Button) {
        self.panel_visible = true;
        self.line(&format!("[panel] shown at {}", anchor.label()));
    }

    fn hide(&mut self) {
        self.panel_visible = false;
        self.line("[panel] hidden");
    }

    fn resize(&mut self, size: PanelSize) {
        self.line(&format!("[panel] {}x{}", size.width, size.height));
    }
}

impl<W: Write> Tabs for TerminalHost<W> {
    fn open(&mut self, url: &str) {
        self.line(&format!("[tab] open {url}"));
        self.line("[tab] paste the final address as: tab <url>");
    }

    fn close(&mut self, tab: TabId) {
        self.line(&format!("[tab] close #{tab}"));
    }
}

impl<W: Write> Toolbar for TerminalHost<W> {
    fn set_icon(&mut self, button: Button, icon: Icon) {
        self.line(&format!("[{}] {}", button.label(), icon.path()));
    }

    fn set_checked(&mut self, button: Button, checked: bool) {
        self.line(&format!("[{}] checked={checked}", button.label()));
    }
}
