use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Upper bound on a single frame body.  A playlist of a few thousand tracks
/// stays well below this.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// One entry of a playlist as delivered by the music API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Track {
    /// Position reported by the API.  Playback order is the order of the
    /// playlist vector, not this field.
    #[serde(default)]
    pub index: usize,
    pub artist: String,
    pub title: String,
    /// Length in whole seconds.
    #[serde(rename = "duration", default)]
    pub duration_secs: u64,
    pub url: String,
}

/// Authoritative playback status reported by the presentation context.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStatus {
    Playing,
    #[default]
    Pause,
}

impl PlaybackStatus {
    pub fn from_playing(playing: bool) -> Self {
        if playing {
            Self::Playing
        } else {
            Self::Pause
        }
    }

    pub fn is_playing(self) -> bool {
        self == Self::Playing
    }
}

/// A message that travels over the bridge under a stable name.
pub trait NamedMessage: Serialize + DeserializeOwned + Send + std::fmt::Debug + 'static {
    /// Every name this message type can carry.
    const NAMES: &'static [&'static str];

    fn name(&self) -> &'static str;
}

/// Messages sent from the control surface to the presentation surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "name", content = "payload", rename_all = "camelCase")]
pub enum ControlMessage {
    /// Replace the playlist unless something is playing.
    LoadPlaylist(Vec<Track>),
    /// Toggle play/pause.
    Play,
    /// Advance; the flag asks the engine to resume playback afterwards.
    Next(bool),
    Prev(bool),
    ShowLogin,
    EmptyPlaylist,
    ApiError(String),
    ShowPlaylist,
}

impl ControlMessage {
    pub const LOAD_PLAYLIST: &'static str = "loadPlaylist";
    pub const PLAY: &'static str = "play";
    pub const NEXT: &'static str = "next";
    pub const PREV: &'static str = "prev";
    pub const SHOW_LOGIN: &'static str = "showLogin";
    pub const EMPTY_PLAYLIST: &'static str = "emptyPlaylist";
    pub const API_ERROR: &'static str = "apiError";
    pub const SHOW_PLAYLIST: &'static str = "showPlaylist";
}

impl NamedMessage for ControlMessage {
    const NAMES: &'static [&'static str] = &[
        Self::LOAD_PLAYLIST,
        Self::PLAY,
        Self::NEXT,
        Self::PREV,
        Self::SHOW_LOGIN,
        Self::EMPTY_PLAYLIST,
        Self::API_ERROR,
        Self::SHOW_PLAYLIST,
    ];

    fn name(&self) -> &'static str {
        match self {
            Self::LoadPlaylist(_) => Self::LOAD_PLAYLIST,
            Self::Play => Self::PLAY,
            Self::Next(_) => Self::NEXT,
            Self::Prev(_) => Self::PREV,
            Self::ShowLogin => Self::SHOW_LOGIN,
            Self::EmptyPlaylist => Self::EMPTY_PLAYLIST,
            Self::ApiError(_) => Self::API_ERROR,
            Self::ShowPlaylist => Self::SHOW_PLAYLIST,
        }
    }
}

/// Messages sent from the presentation surface to the control surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "name", content = "payload", rename_all = "camelCase")]
pub enum PresentationMessage {
    State(PlaybackStatus),
    OpenAuthTab,
    Logout,
}

impl PresentationMessage {
    pub const STATE: &'static str = "state";
    pub const OPEN_AUTH_TAB: &'static str = "openAuthTab";
    pub const LOGOUT: &'static str = "logout";
}

impl NamedMessage for PresentationMessage {
    const NAMES: &'static [&'static str] = &[Self::STATE, Self::OPEN_AUTH_TAB, Self::LOGOUT];

    fn name(&self) -> &'static str {
        match self {
            Self::State(_) => Self::STATE,
            Self::OpenAuthTab => Self::OPEN_AUTH_TAB,
            Self::Logout => Self::LOGOUT,
        }
    }
}

/// Length-prefixed JSON framing: 4-byte big-endian body length, then the body.
pub fn encode_frame<M: NamedMessage>(msg: &M) -> anyhow::Result<Vec<u8>> {
    let json = serde_json::to_vec(msg)?;
    if json.len() > MAX_FRAME_LEN {
        anyhow::bail!("frame of {} bytes exceeds limit", json.len());
    }
    let len = json.len() as u32;
    let mut result = Vec::with_capacity(4 + json.len());
    result.extend_from_slice(&len.to_be_bytes());
    result.extend_from_slice(&json);
    Ok(result)
}

/// Outcome of trying to pull one frame off the front of a buffer.
#[derive(Debug)]
pub enum Decoded<M> {
    /// Not enough bytes buffered yet.
    Incomplete,
    /// A full frame; `usize` is the number of bytes it occupied.
    Message(M, usize),
    /// A full frame whose body is not a known message.  The bytes can be
    /// skipped without losing sync.
    Malformed(String, usize),
}

pub fn decode_frame<M: NamedMessage>(data: &[u8]) -> anyhow::Result<Decoded<M>> {
    if data.len() < 4 {
        return Ok(Decoded::Incomplete);
    }
    let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if len > MAX_FRAME_LEN {
        anyhow::bail!("frame header announces {} bytes, stream is out of sync", len);
    }
    if data.len() < 4 + len {
        return Ok(Decoded::Incomplete);
    }
    match serde_json::from_slice(&data[4..4 + len]) {
        Ok(msg) => Ok(Decoded::Message(msg, 4 + len)),
        Err(e) => Ok(Decoded::Malformed(e.to_string(), 4 + len)),
    }
}
