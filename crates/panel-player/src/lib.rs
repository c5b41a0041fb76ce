//! Presentation context: the playback engine, the rendered playlist and the
//! event loop that connects them to the bridge and to the audio output.

pub mod core;
pub mod engine;
pub mod error;
pub mod mpv;
pub mod output;
pub mod view;

pub use crate::core::{PresentationCore, PresentationEvent, ViewSnapshot};
pub use engine::{EngineEventKind, EngineNotification, EngineState, PlaybackEngine};
pub use error::{EngineError, PlaybackError};
pub use output::{MemoryOutput, OutputEvent, OutputHandle, SessionId};
pub use view::{format_duration, PlaylistView, Section};
