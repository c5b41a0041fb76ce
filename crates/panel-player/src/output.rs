//! The audio-output seam of the presentation context.
//!
//! Every `load` opens a new session.  Backends stamp each notification with
//! the session it belongs to so the engine can ignore notifications that
//! outlived their track.

use std::sync::{Arc, Mutex};

use crate::error::PlaybackError;

pub type SessionId = u64;

/// Asynchronous notifications from the output backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    /// The loaded track played to its end.
    Ended { session: SessionId },
    /// The loaded track cannot be played.
    Error {
        session: SessionId,
        error: PlaybackError,
    },
}

impl OutputEvent {
    pub fn session(&self) -> SessionId {
        match self {
            Self::Ended { session } | Self::Error { session, .. } => *session,
        }
    }
}

/// Commands the engine issues to its output.  None of them block; failures
/// surface later as [`OutputEvent::Error`].
pub trait OutputHandle: Send {
    /// Point the output at `url` without starting it.
    fn load(&mut self, url: &str) -> SessionId;
    /// Start or resume the loaded source.
    fn start(&mut self);
    /// Suspend, keeping the in-track position.
    fn pause(&mut self);
    /// Rewind the loaded source to its beginning, dropping buffered data.
    fn reset(&mut self);
}

impl<T: OutputHandle + ?Sized> OutputHandle for Box<T> {
    fn load(&mut self, url: &str) -> SessionId {
        (**self).load(url)
    }

    fn start(&mut self) {
        (**self).start()
    }

    fn pause(&mut self) {
        (**self).pause()
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

/// A call recorded by [`MemoryOutput`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputCall {
    Load(String),
    Start,
    Pause,
    Reset,
}

/// Silent output that only records what it was asked to do.  Used for
/// headless runs and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryOutput {
    calls: Arc<Mutex<Vec<OutputCall>>>,
    session: SessionId,
}

impl MemoryOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared view of the call log; stays valid after the output moves into
    /// an engine.
    pub fn log(&self) -> OutputLog {
        OutputLog {
            calls: Arc::clone(&self.calls),
        }
    }

    fn record(&self, call: OutputCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

impl OutputHandle for MemoryOutput {
    fn load(&mut self, url: &str) -> SessionId {
        self.session += 1;
        self.record(OutputCall::Load(url.to_string()));
        self.session
    }

    fn start(&mut self) {
        self.record(OutputCall::Start);
    }

    fn pause(&mut self) {
        self.record(OutputCall::Pause);
    }

    fn reset(&mut self) {
        self.record(OutputCall::Reset);
    }
}

#[derive(Debug, Clone)]
pub struct OutputLog {
    calls: Arc<Mutex<Vec<OutputCall>>>,
}

impl OutputLog {
    pub fn calls(&self) -> Vec<OutputCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// URL of the most recent `load`.
    pub fn last_loaded(&self) -> Option<String> {
        self.calls().into_iter().rev().find_map(|call| match call {
            OutputCall::Load(url) => Some(url),
            _ => None,
        })
    }

    pub fn clear(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }
}
