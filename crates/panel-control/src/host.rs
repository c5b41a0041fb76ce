//! Browser-chrome capabilities the controller drives.  The controller never
//! sees widgets, only these traits.

use panel_proto::config::PanelSize;

/// Identifies a browser tab handed to [`Tabs::close`].
pub type TabId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    Prev,
    Play,
    Next,
    /// Toggle button that shows the panel.
    Music,
}

impl Button {
    pub fn label(self) -> &'static str {
        match self {
            Self::Prev => "Previous Track",
            Self::Play => "Play/Pause Track",
            Self::Next => "Next Track",
            Self::Music => "Show Playlist",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Icon {
    Prev,
    Play,
    Pause,
    Next,
    Music,
}

impl Icon {
    pub fn name(self) -> &'static str {
        match self {
            Self::Prev => "prev",
            Self::Play => "play",
            Self::Pause => "pause",
            Self::Next => "next",
            Self::Music => "music",
        }
    }

    pub fn path(self) -> String {
        icon_path(self.name())
    }
}

pub fn icon_path(name: &str) -> String {
    format!("./images/{name}-64.png")
}

/// The popup panel hosting the presentation context.
pub trait Panel {
    /// Show the panel anchored at `anchor`.
    fn show(&mut self, anchor: Button);
    fn hide(&mut self);
    fn resize(&mut self, size: PanelSize);
}

pub trait Tabs {
    fn open(&mut self, url: &str);
    fn close(&mut self, tab: TabId);
}

pub trait Toolbar {
    fn set_icon(&mut self, button: Button, icon: Icon);
    /// Checked state of a toggle button.
    fn set_checked(&mut self, button: Button, checked: bool);
}

/// Everything the controller needs from the host.
pub trait Host: Panel + Tabs + Toolbar + Send {}

impl<T: Panel + Tabs + Toolbar + Send> Host for T {}
