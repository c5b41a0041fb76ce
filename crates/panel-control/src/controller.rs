/// Controller: single-owner event loop of the control context.
///
/// Owns the toolbar-facing state: whether the user is logged in and a
/// mirrored, best-effort copy of the playback status.  Button clicks update
/// the mirror optimistically and forward a command over the bridge; the
/// presentation side's `state` reports overwrite the guess whenever they
/// arrive.
///
/// The controller also runs the login flow: it opens the authorization tab,
/// watches tabs for the callback page, stores the token and reloads the
/// playlist.  Playlist requests run on their own task; the result comes back
/// through the same loop, so toolbar input keeps flowing while the API is
/// slow.
use panel_proto::config::{Config, PanelConfig, PanelSize};
use panel_proto::{
    ControlMessage, ControlPort, NamedMessage, PlaybackStatus, PresentationMessage, Track,
};
use regex::Regex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiError};
use crate::host::{Button, Host, Icon, TabId};
use crate::store::{ConfigStore, ACCESS_TOKEN_KEY};

/// Local inputs of the control context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEvent {
    PrevClicked,
    PlayClicked,
    NextClicked,
    /// The music toggle button changed state.
    PanelToggled(bool),
    /// The panel was closed by the host.
    PanelHidden,
    /// A browser tab finished loading `url`.
    TabReady { tab: TabId, url: String },
    Shutdown,
}

/// The controller's view of playback.  `playing` may be a prediction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MirroredControlState {
    pub playing: bool,
    pub logged_in: bool,
}

/// Pull the token out of the OAuth callback URL.
pub fn extract_access_token(url: &str) -> Option<String> {
    let re = Regex::new(r"(?i)access_token=([^&#]+)").ok()?;
    re.captures(url).map(|caps| caps[1].to_string())
}

/// A finished playlist request, tagged with the refresh that started it.
type PlaylistFetch = (u64, Result<Vec<Track>, ApiError>);

pub struct Controller<A, S, H> {
    api: A,
    store: S,
    host: H,
    port: ControlPort,
    panel: PanelConfig,
    scope: String,
    state: MirroredControlState,
    /// Bumped by every refresh; older fetch results are dropped.
    refresh_generation: u64,
    fetch_tx: mpsc::UnboundedSender<PlaylistFetch>,
    fetch_rx: mpsc::UnboundedReceiver<PlaylistFetch>,
}

impl<A: ApiClient, S: ConfigStore, H: Host> Controller<A, S, H> {
    pub fn new(api: A, store: S, host: H, mut port: ControlPort, config: &Config) -> Self {
        port.register_all(PresentationMessage::NAMES);
        let (fetch_tx, fetch_rx) = mpsc::unbounded_channel();
        Self {
            api,
            store,
            host,
            port,
            panel: config.panel.clone(),
            scope: config.api.scope.clone(),
            state: MirroredControlState::default(),
            refresh_generation: 0,
            fetch_tx,
            fetch_rx,
        }
    }

    pub fn state(&self) -> MirroredControlState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state.playing
    }

    pub fn is_logged_in(&self) -> bool {
        self.state.logged_in
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Startup: pick up a stored token, set the toolbar icons, load the
    /// playlist in the background so the buttons work before the panel opens.
    pub fn activate(&mut self) {
        if let Some(token) = self.store.get(ACCESS_TOKEN_KEY) {
            self.api.set_access_token(Some(token));
        }
        self.host.set_icon(Button::Prev, Icon::Prev);
        self.host.set_icon(Button::Play, Icon::Play);
        self.host.set_icon(Button::Next, Icon::Next);
        self.host.set_icon(Button::Music, Icon::Music);
        self.refresh_playlist();
    }

    /// Run until `Shutdown`, or until either input source closes.
    pub async fn run(mut self, mut events: mpsc::Receiver<ControlEvent>) -> anyhow::Result<()> {
        info!("Controller: starting event loop");
        self.activate();

        loop {
            tokio::select! {
                msg = self.port.recv() => match msg {
                    Some(msg) => self.handle_message(msg),
                    None => {
                        info!("Controller: presentation surface gone, shutting down");
                        break;
                    }
                },
                evt = events.recv() => match evt {
                    Some(ControlEvent::Shutdown) | None => {
                        info!("Controller: shutdown");
                        break;
                    }
                    Some(evt) => self.handle_event(evt),
                },
                // Never closes: the controller holds a sender.
                Some((generation, result)) = self.fetch_rx.recv() => {
                    self.playlist_loaded(generation, result);
                }
            }
        }
        Ok(())
    }

    pub fn handle_event(&mut self, evt: ControlEvent) {
        match evt {
            ControlEvent::PrevClicked => self.prev_track(),
            ControlEvent::PlayClicked => self.play_track(),
            ControlEvent::NextClicked => self.next_track(),
            ControlEvent::PanelToggled(checked) => self.toggle_panel(checked),
            ControlEvent::PanelHidden => self.panel_hidden(),
            ControlEvent::TabReady { tab, url } => self.tab_ready(tab, &url),
            ControlEvent::Shutdown => {}
        }
    }

    pub fn handle_message(&mut self, msg: PresentationMessage) {
        debug!("Controller: message {}", msg.name());
        match msg {
            PresentationMessage::State(status) => self.apply_status(status),
            PresentationMessage::OpenAuthTab => {
                let url = self.api.auth_url(&self.scope);
                self.host.hide();
                self.host.open(&url);
            }
            PresentationMessage::Logout => {
                info!("Controller: logout");
                if let Err(e) = self.store.delete(ACCESS_TOKEN_KEY) {
                    warn!("Controller: could not forget access token: {}", e);
                }
                self.api.set_access_token(None);
                self.refresh_playlist();
                self.host.set_icon(Button::Play, Icon::Play);
                self.state.logged_in = false;
                self.state.playing = false;
            }
        }
    }

    pub fn prev_track(&mut self) {
        if !self.state.logged_in {
            return;
        }
        self.predict(true);
        self.port.send(ControlMessage::Prev(true));
    }

    pub fn next_track(&mut self) {
        if !self.state.logged_in {
            return;
        }
        self.predict(true);
        self.port.send(ControlMessage::Next(true));
    }

    pub fn play_track(&mut self) {
        if !self.state.logged_in {
            return;
        }
        self.predict(!self.state.playing);
        self.port.send(ControlMessage::Play);
    }

    pub fn toggle_panel(&mut self, checked: bool) {
        if checked {
            self.host.show(Button::Music);
            self.port.send(ControlMessage::ShowPlaylist);
        }
    }

    pub fn panel_hidden(&mut self) {
        self.host.set_checked(Button::Music, false);
    }

    /// Finish the login flow if `url` is the OAuth callback page.
    pub fn tab_ready(&mut self, tab: TabId, url: &str) {
        if !url.contains(self.api.access_token_callback_url()) {
            return;
        }
        let Some(token) = extract_access_token(url) else {
            warn!("Controller: callback page without access token, ignoring");
            return;
        };

        info!("Controller: received access token");
        if let Err(e) = self.store.set(ACCESS_TOKEN_KEY, &token) {
            warn!("Controller: could not store access token: {}", e);
        }
        self.api.set_access_token(Some(token));
        self.host.close(tab);
        self.refresh_playlist();
    }

    /// Show login, or start fetching the user's playlist.  The outcome is
    /// applied by [`Controller::playlist_loaded`] once the request finishes.
    pub fn refresh_playlist(&mut self) {
        self.refresh_generation += 1;
        let Some(token) = self.store.get(ACCESS_TOKEN_KEY) else {
            self.port.send(ControlMessage::ShowLogin);
            self.resize(self.panel.login);
            return;
        };
        if self.api.access_token().is_none() {
            self.api.set_access_token(Some(token));
        }

        let generation = self.refresh_generation;
        let fetch = self.api.get_playlist();
        let done = self.fetch_tx.clone();
        tokio::spawn(async move {
            let _ = done.send((generation, fetch.await));
        });
    }

    /// Show an empty or error notice, or the fetched playlist.  Results of a
    /// refresh that has since been superseded are ignored.
    pub fn playlist_loaded(&mut self, generation: u64, result: Result<Vec<Track>, ApiError>) {
        if generation != self.refresh_generation {
            debug!("Controller: dropping superseded playlist fetch #{}", generation);
            return;
        }
        match result {
            Ok(tracks) if tracks.is_empty() => {
                self.resize(self.panel.empty_playlist);
                self.port.send(ControlMessage::EmptyPlaylist);
            }
            Ok(tracks) => {
                info!("Controller: playlist of {} tracks", tracks.len());
                self.state.logged_in = true;
                self.resize(self.panel.playlist);
                self.port.send(ControlMessage::LoadPlaylist(tracks));
            }
            Err(e) => {
                warn!("Controller: playlist request failed: {}", e);
                self.resize(self.panel.error);
                self.port.send(ControlMessage::ApiError(e.to_string()));
            }
        }
    }

    fn resize(&mut self, size: PanelSize) {
        self.host.resize(size);
    }

    fn predict(&mut self, playing: bool) {
        self.state.playing = playing;
        self.host.set_icon(Button::Play, play_icon(playing));
    }

    fn apply_status(&mut self, status: PlaybackStatus) {
        self.state.playing = status.is_playing();
        self.host.set_icon(Button::Play, play_icon(self.state.playing));
    }
}

/// Icon for the play button: offer `pause` while playing.
fn play_icon(playing: bool) -> Icon {
    if playing {
        Icon::Pause
    } else {
        Icon::Play
    }
}
