/// PresentationCore: single-owner event loop of the presentation context.
///
/// Owns the `PlaybackEngine` and the `PlaylistView` exclusively.  Inputs are
/// bridge messages from the control surface and `PresentationEvent`s (row
/// clicks, login/logout buttons, output notifications).  The engine exists
/// before any message name is registered on the port, so no handler can run
/// against a missing engine.
///
/// After every input the core publishes a `ViewSnapshot` on a watch channel
/// for whatever renders the panel.
use panel_proto::{ControlMessage, NamedMessage, PlaybackStatus, PresentationMessage, PresentationPort, Track};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::engine::{EngineState, PlaybackEngine};
use crate::output::{OutputEvent, OutputHandle};
use crate::view::{PlaylistView, RenderedItem, Section};

/// Local inputs of the presentation context.
#[derive(Debug)]
pub enum PresentationEvent {
    /// A rendered playlist row was clicked.
    ItemActivated(usize),
    LoginClicked,
    LogoutClicked,
    Output(OutputEvent),
    Shutdown,
}

/// Read-only picture of the panel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewSnapshot {
    pub section: Section,
    pub items: Vec<RenderedItem>,
    pub active: Option<usize>,
    pub current_index: usize,
    pub playing: bool,
    pub engine_state: EngineState,
}

pub struct PresentationCore<O> {
    engine: PlaybackEngine<O>,
    view: PlaylistView,
    port: PresentationPort,
    item_template: String,
    snapshot_tx: watch::Sender<ViewSnapshot>,
}

impl<O: OutputHandle> PresentationCore<O> {
    pub fn new(output: O, mut port: PresentationPort, item_template: String) -> Self {
        let engine = PlaybackEngine::new(output);
        port.register_all(ControlMessage::NAMES);
        let (snapshot_tx, _) = watch::channel(ViewSnapshot::default());
        Self {
            engine,
            view: PlaylistView::new(),
            port,
            item_template,
            snapshot_tx,
        }
    }

    pub fn subscribe_view(&self) -> watch::Receiver<ViewSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn engine(&self) -> &PlaybackEngine<O> {
        &self.engine
    }

    pub fn view(&self) -> &PlaylistView {
        &self.view
    }

    /// Run until `Shutdown`, or until either input source closes.
    pub async fn run(mut self, mut events: mpsc::Receiver<PresentationEvent>) -> anyhow::Result<()> {
        info!("PresentationCore: starting event loop");
        self.publish();

        loop {
            tokio::select! {
                msg = self.port.recv() => match msg {
                    Some(msg) => self.handle_message(msg),
                    None => {
                        info!("PresentationCore: control surface gone, shutting down");
                        break;
                    }
                },
                evt = events.recv() => match evt {
                    Some(PresentationEvent::Shutdown) | None => {
                        info!("PresentationCore: shutdown");
                        break;
                    }
                    Some(evt) => self.handle_event(evt),
                },
            }
            self.publish();
        }
        Ok(())
    }

    pub fn handle_message(&mut self, msg: ControlMessage) {
        debug!("PresentationCore: message {}", msg.name());
        match msg {
            ControlMessage::LoadPlaylist(tracks) => self.load_playlist(tracks),
            ControlMessage::Play => self.toggle_play(),
            ControlMessage::Next(resume) => self.navigate(resume, |engine| engine.next()),
            ControlMessage::Prev(resume) => self.navigate(resume, |engine| engine.prev()),
            ControlMessage::ShowLogin => self.view.show(Section::Login),
            ControlMessage::EmptyPlaylist => self.view.show(Section::EmptyPlaylist),
            ControlMessage::ApiError(message) => self.view.show(Section::ApiError(message)),
            ControlMessage::ShowPlaylist => {
                if !self.view.items().is_empty() {
                    self.view.show(Section::Playlist);
                }
            }
        }
    }

    pub fn handle_event(&mut self, evt: PresentationEvent) {
        match evt {
            PresentationEvent::ItemActivated(position) => {
                match self.view.activate(position, &mut self.engine) {
                    Ok(status) => self.report(status),
                    Err(e) => warn!("PresentationCore: activation ignored: {}", e),
                }
            }
            PresentationEvent::LoginClicked => self.port.send(PresentationMessage::OpenAuthTab),
            PresentationEvent::LogoutClicked => self.port.send(PresentationMessage::Logout),
            PresentationEvent::Output(output_event) => self.handle_output(output_event),
            PresentationEvent::Shutdown => {}
        }
    }

    fn load_playlist(&mut self, tracks: Vec<Track>) {
        if self.engine.is_playing() {
            info!("PresentationCore: playlist update ignored while playing");
            return;
        }
        self.view.show(Section::Playlist);
        self.view.render(&tracks, &self.item_template);
        self.engine.set_playlist(tracks);
    }

    fn toggle_play(&mut self) {
        let current = self.engine.current_index();
        if self.engine.is_playing() {
            self.engine.pause();
            self.view.clear_active(current);
        } else {
            self.engine.play();
            if self.engine.is_playing() {
                self.view.mark_active(current);
            }
        }
    }

    fn navigate(&mut self, resume: bool, step: impl FnOnce(&mut PlaybackEngine<O>)) {
        self.view.clear_active(self.engine.current_index());
        step(&mut self.engine);
        if resume {
            self.engine.play();
            if self.engine.is_playing() {
                self.view.mark_active(self.engine.current_index());
            }
        }
    }

    fn handle_output(&mut self, event: OutputEvent) {
        let before = self.engine.current_index();
        let Some(notification) = self.engine.handle_output_event(event) else {
            return;
        };
        self.view.clear_active(before);
        if notification.status.is_playing() {
            self.view.mark_active(notification.index);
        }
        if notification.error.is_some() {
            self.report(notification.status);
        }
    }

    fn report(&self, status: PlaybackStatus) {
        self.port.send(PresentationMessage::State(status));
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(ViewSnapshot {
            section: self.view.section().clone(),
            items: self.view.items().to_vec(),
            active: self.view.active(),
            current_index: self.engine.current_index(),
            playing: self.engine.is_playing(),
            engine_state: self.engine.state(),
        });
    }
}
