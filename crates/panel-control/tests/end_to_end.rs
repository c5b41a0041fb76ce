//! Both contexts running over the in-process bridge: a controller with fake
//! browser chrome and a presentation core with a recording output.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use panel_control::{
    ApiClient, ApiError, Button, ControlEvent, Controller, Icon, MemoryStore, Panel, TabId, Tabs,
    Toolbar, ACCESS_TOKEN_KEY,
};
use panel_player::output::{OutputCall, OutputLog};
use panel_player::{
    MemoryOutput, OutputEvent, PlaybackError, PresentationCore, PresentationEvent, Section,
    ViewSnapshot,
};
use panel_proto::config::{Config, PanelSize};
use panel_proto::{ChannelBridge, Track};
use tokio::sync::{mpsc, watch};

const CALLBACK: &str = "https://auth.test/blank.html";

#[derive(Clone, Default)]
struct RecordingHost {
    icons: Arc<Mutex<Vec<(Button, Icon)>>>,
    opened: Arc<Mutex<Vec<String>>>,
    closed: Arc<Mutex<Vec<TabId>>>,
}

impl RecordingHost {
    fn last_play_icon(&self) -> Option<Icon> {
        self.icons
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(button, _)| *button == Button::Play)
            .map(|(_, icon)| *icon)
    }
}

impl Panel for RecordingHost {
    fn show(&mut self, _anchor: Button) {}
    fn hide(&mut self) {}
    fn resize(&mut self, _size: PanelSize) {}
}

impl Tabs for RecordingHost {
    fn open(&mut self, url: &str) {
        self.opened.lock().unwrap().push(url.to_string());
    }
    fn close(&mut self, tab: TabId) {
        self.closed.lock().unwrap().push(tab);
    }
}

impl Toolbar for RecordingHost {
    fn set_icon(&mut self, button: Button, icon: Icon) {
        self.icons.lock().unwrap().push((button, icon));
    }
    fn set_checked(&mut self, _button: Button, _checked: bool) {}
}

struct StaticApi {
    tracks: Vec<Track>,
    token: Option<String>,
}

impl ApiClient for StaticApi {
    fn get_playlist(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Track>, ApiError>> + Send + 'static {
        let result = match self.token {
            Some(_) => Ok(self.tracks.clone()),
            None => Err(ApiError::NotAuthorized),
        };
        std::future::ready(result)
    }

    fn auth_url(&self, scope: &str) -> String {
        format!("https://auth.test/authorize?scope={scope}")
    }

    fn access_token_callback_url(&self) -> &str {
        CALLBACK
    }

    fn access_token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn set_access_token(&mut self, token: Option<String>) {
        self.token = token;
    }
}

fn tracks() -> Vec<Track> {
    ["A", "B", "C"]
        .iter()
        .enumerate()
        .map(|(i, name)| Track {
            index: i,
            artist: format!("Artist {name}"),
            title: format!("Song {name}"),
            duration_secs: 30 + i as u64,
            url: format!("https://cdn.test/{name}.mp3"),
        })
        .collect()
}

struct Harness {
    control_tx: mpsc::Sender<ControlEvent>,
    presentation_tx: mpsc::Sender<PresentationEvent>,
    view: watch::Receiver<ViewSnapshot>,
    output: OutputLog,
    host: RecordingHost,
}

fn start(store: MemoryStore) -> Harness {
    let config = Config::default();
    let (control_port, presentation_port) = ChannelBridge::in_process();

    let output = MemoryOutput::new();
    let log = output.log();
    let core = PresentationCore::new(output, presentation_port, "%number%:%title%".to_string());
    let view = core.subscribe_view();
    let (presentation_tx, presentation_rx) = mpsc::channel(16);
    tokio::spawn(core.run(presentation_rx));

    let host = RecordingHost::default();
    let api = StaticApi {
        tracks: tracks(),
        token: None,
    };
    let controller = Controller::new(api, store, host.clone(), control_port, &config);
    let (control_tx, control_rx) = mpsc::channel(16);
    tokio::spawn(controller.run(control_rx));

    Harness {
        control_tx,
        presentation_tx,
        view,
        output: log,
        host,
    }
}

async fn wait_view(
    view: &mut watch::Receiver<ViewSnapshot>,
    pred: impl FnMut(&ViewSnapshot) -> bool,
) -> ViewSnapshot {
    tokio::time::timeout(Duration::from_secs(2), view.wait_for(pred))
        .await
        .expect("view did not reach expected state")
        .expect("presentation loop stopped")
        .clone()
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..100 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn test_stored_token_loads_playlist_into_panel() {
    let mut h = start(MemoryStore::with(ACCESS_TOKEN_KEY, "tok"));

    let snapshot = wait_view(&mut h.view, |s| s.section == Section::Playlist).await;
    let rows: Vec<&str> = snapshot.items.iter().map(|i| i.markup.as_str()).collect();
    assert_eq!(rows, vec!["0:Song A", "1:Song B", "2:Song C"]);
    assert!(!snapshot.playing);
    assert_eq!(h.output.last_loaded().as_deref(), Some("https://cdn.test/A.mp3"));
}

#[tokio::test]
async fn test_toolbar_next_plays_following_track() {
    let mut h = start(MemoryStore::with(ACCESS_TOKEN_KEY, "tok"));
    wait_view(&mut h.view, |s| s.section == Section::Playlist).await;

    h.control_tx.send(ControlEvent::NextClicked).await.unwrap();

    let snapshot = wait_view(&mut h.view, |s| s.playing).await;
    assert_eq!(snapshot.current_index, 1);
    assert_eq!(snapshot.active, Some(1));
    assert_eq!(h.output.last_loaded().as_deref(), Some("https://cdn.test/B.mp3"));
    assert_eq!(h.host.last_play_icon(), Some(Icon::Pause));
}

#[tokio::test]
async fn test_row_click_pause_reaches_toolbar() {
    let mut h = start(MemoryStore::with(ACCESS_TOKEN_KEY, "tok"));
    wait_view(&mut h.view, |s| s.section == Section::Playlist).await;

    h.presentation_tx
        .send(PresentationEvent::ItemActivated(2))
        .await
        .unwrap();
    wait_view(&mut h.view, |s| s.playing && s.active == Some(2)).await;
    let host = h.host.clone();
    wait_until(|| host.last_play_icon() == Some(Icon::Pause)).await;

    h.presentation_tx
        .send(PresentationEvent::ItemActivated(2))
        .await
        .unwrap();
    let snapshot = wait_view(&mut h.view, |s| !s.playing).await;
    assert_eq!(snapshot.current_index, 2);
    assert_eq!(snapshot.active, None);
    wait_until(|| host.last_play_icon() == Some(Icon::Play)).await;
}

#[tokio::test]
async fn test_failed_track_skips_forward() {
    let mut h = start(MemoryStore::with(ACCESS_TOKEN_KEY, "tok"));
    wait_view(&mut h.view, |s| s.section == Section::Playlist).await;

    h.presentation_tx
        .send(PresentationEvent::ItemActivated(0))
        .await
        .unwrap();
    wait_view(&mut h.view, |s| s.playing).await;

    let session = h
        .output
        .calls()
        .iter()
        .filter(|c| matches!(c, OutputCall::Load(_)))
        .count() as u64;
    h.presentation_tx
        .send(PresentationEvent::Output(OutputEvent::Error {
            session,
            error: PlaybackError::Network("connection reset".into()),
        }))
        .await
        .unwrap();

    let snapshot = wait_view(&mut h.view, |s| s.current_index == 1).await;
    assert!(snapshot.playing);
    assert_eq!(h.output.last_loaded().as_deref(), Some("https://cdn.test/B.mp3"));
}

#[tokio::test]
async fn test_login_flow_from_panel_button() {
    let mut h = start(MemoryStore::new());
    wait_view(&mut h.view, |s| s.section == Section::Login).await;

    h.presentation_tx
        .send(PresentationEvent::LoginClicked)
        .await
        .unwrap();
    let opened = h.host.opened.clone();
    wait_until(|| !opened.lock().unwrap().is_empty()).await;
    assert!(opened.lock().unwrap()[0].contains("scope=audio,offline"));

    h.control_tx
        .send(ControlEvent::TabReady {
            tab: 4,
            url: format!("{CALLBACK}#access_token=fresh&expires_in=0&user_id=1"),
        })
        .await
        .unwrap();

    let snapshot = wait_view(&mut h.view, |s| s.section == Section::Playlist).await;
    assert_eq!(snapshot.items.len(), 3);
    assert_eq!(*h.host.closed.lock().unwrap(), vec![4]);
}

#[tokio::test]
async fn test_logout_returns_to_login() {
    let mut h = start(MemoryStore::with(ACCESS_TOKEN_KEY, "tok"));
    wait_view(&mut h.view, |s| s.section == Section::Playlist).await;

    h.presentation_tx
        .send(PresentationEvent::LogoutClicked)
        .await
        .unwrap();

    wait_view(&mut h.view, |s| s.section == Section::Login).await;
}
