/// PlaybackEngine: sole owner of the playlist, the current index and the
/// playing flag.
///
/// ```text
///   Empty ──set_playlist──► Ready ──play──► Playing ──pause──► Paused
///                             ▲                 │                 │
///                             └──load── Stopped ◄──────stop───────┘
/// ```
///
/// Navigation is circular.  The engine never resumes playback on its own
/// except in reaction to output notifications: a finished track always
/// advances and plays, a failed track advances and plays only if the engine
/// was playing when the failure arrived.
use panel_proto::{PlaybackStatus, Track};
use tracing::{debug, info, warn};

use crate::error::{EngineError, PlaybackError};
use crate::output::{OutputEvent, OutputHandle, SessionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    #[default]
    Empty,
    Ready,
    Playing,
    Paused,
    Stopped,
}

/// Which output notification a subscriber wants to hear about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEventKind {
    Ended,
    Error,
}

/// What the engine did in reaction to an output notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineNotification {
    pub kind: EngineEventKind,
    /// Index current after the reaction.
    pub index: usize,
    /// Status to report to the control surface.
    pub status: PlaybackStatus,
    pub error: Option<PlaybackError>,
}

type Handler = Box<dyn FnMut(&EngineNotification) + Send>;

pub struct PlaybackEngine<O> {
    output: O,
    playlist: Vec<Track>,
    current: usize,
    playing: bool,
    state: EngineState,
    /// Output session of the loaded track; `None` when nothing is loaded.
    session: Option<SessionId>,
    subscribers: Vec<(EngineEventKind, Handler)>,
}

impl<O: OutputHandle> PlaybackEngine<O> {
    pub fn new(output: O) -> Self {
        Self {
            output,
            playlist: Vec::new(),
            current: 0,
            playing: false,
            state: EngineState::Empty,
            session: None,
            subscribers: Vec::new(),
        }
    }

    pub fn playlist(&self) -> &[Track] {
        &self.playlist
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    /// `None` when the playlist is empty.
    pub fn current_track(&self) -> Option<&Track> {
        self.playlist.get(self.current)
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn status(&self) -> PlaybackStatus {
        PlaybackStatus::from_playing(self.playing)
    }

    /// Output session of the loaded track.
    pub fn session(&self) -> Option<SessionId> {
        self.session
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    /// Register `handler` for notifications of `kind`.  Handlers run after
    /// the engine has finished reacting.
    pub fn subscribe<F>(&mut self, kind: EngineEventKind, handler: F)
    where
        F: FnMut(&EngineNotification) + Send + 'static,
    {
        self.subscribers.push((kind, Box::new(handler)));
    }

    /// Replace the playlist wholesale.  Stops playback if needed, resets the
    /// index to 0 and loads the first track without starting it.
    pub fn set_playlist(&mut self, tracks: Vec<Track>) {
        if self.playing {
            self.stop();
        }
        info!("engine: playlist replaced ({} tracks)", tracks.len());
        self.current = 0;
        self.playlist = tracks;
        self.session = None;
        if self.playlist.is_empty() {
            self.state = EngineState::Empty;
        } else {
            self.load_current();
        }
    }

    /// Start the current track.  No-op without one.
    pub fn play(&mut self) {
        if self.current_track().is_none() {
            debug!("engine: play ignored, no current track");
            return;
        }
        self.output.start();
        self.playing = true;
        self.state = EngineState::Playing;
    }

    /// Suspend output; the in-track position survives.
    pub fn pause(&mut self) {
        self.playing = false;
        self.output.pause();
        if !self.playlist.is_empty() {
            self.state = EngineState::Paused;
        }
    }

    /// Pause if playing, then rewind the current track to its start.
    pub fn stop(&mut self) {
        if self.playing {
            self.pause();
        }
        self.output.reset();
        if !self.playlist.is_empty() {
            self.state = EngineState::Stopped;
        }
    }

    /// Stop and move to the following track, wrapping after the last one.
    /// The new track is loaded but not started.
    pub fn next(&mut self) {
        if self.playlist.is_empty() {
            return;
        }
        self.stop();
        self.current = (self.current + 1) % self.playlist.len();
        self.load_current();
    }

    /// Stop and move to the preceding track, wrapping before the first one.
    /// The new track is loaded but not started.
    pub fn prev(&mut self) {
        if self.playlist.is_empty() {
            return;
        }
        self.stop();
        self.current = match self.current {
            0 => self.playlist.len() - 1,
            n => n - 1,
        };
        self.load_current();
    }

    /// Make `index` current and load it without starting.  Playback in
    /// progress is stopped first.
    pub fn select(&mut self, index: usize) -> Result<(), EngineError> {
        if index >= self.playlist.len() {
            return Err(EngineError::IndexOutOfRange {
                index,
                len: self.playlist.len(),
            });
        }
        if self.playing {
            self.stop();
        }
        self.current = index;
        self.load_current();
        Ok(())
    }

    /// React to an output notification.  Notifications from a session other
    /// than the loaded one are dropped and yield `None`.
    pub fn handle_output_event(&mut self, event: OutputEvent) -> Option<EngineNotification> {
        if self.session != Some(event.session()) {
            debug!(
                "engine: dropping stale output event (session {}, loaded {:?})",
                event.session(),
                self.session
            );
            return None;
        }

        let notification = match event {
            OutputEvent::Ended { .. } => {
                debug!("engine: track {} ended", self.current);
                self.next();
                self.play();
                EngineNotification {
                    kind: EngineEventKind::Ended,
                    index: self.current,
                    status: self.status(),
                    error: None,
                }
            }
            OutputEvent::Error { error, .. } => {
                let was_playing = self.playing;
                warn!("engine: track {} failed: {}", self.current, error);
                self.next();
                if was_playing {
                    self.play();
                }
                EngineNotification {
                    kind: EngineEventKind::Error,
                    index: self.current,
                    status: PlaybackStatus::from_playing(was_playing),
                    error: Some(error),
                }
            }
        };

        for (kind, handler) in self.subscribers.iter_mut() {
            if *kind == notification.kind {
                handler(&notification);
            }
        }
        Some(notification)
    }

    fn load_current(&mut self) {
        if let Some(track) = self.playlist.get(self.current) {
            debug!("engine: loading track {} ({})", self.current, track.url);
            self.session = Some(self.output.load(&track.url));
            self.state = EngineState::Ready;
        }
    }
}
