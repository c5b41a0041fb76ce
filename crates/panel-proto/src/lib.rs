//! Types shared by the control and presentation contexts: playlist data,
//! the named messages exchanged between them, the bridge that carries those
//! messages, and on-disk configuration.

pub mod bridge;
pub mod config;
pub mod platform;
pub mod protocol;

pub use bridge::{ChannelBridge, ControlPort, Port, PortSender, PresentationPort};
pub use protocol::{ControlMessage, NamedMessage, PlaybackStatus, PresentationMessage, Track};
