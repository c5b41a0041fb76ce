//! Rendered playlist plus the single "active" row mark.

use panel_proto::{PlaybackStatus, Track};
use tracing::debug;

use crate::engine::PlaybackEngine;
use crate::error::EngineError;
use crate::output::OutputHandle;

pub const PLACEHOLDER_NUMBER: &str = "%number%";
pub const PLACEHOLDER_AUTHOR: &str = "%author%";
pub const PLACEHOLDER_TITLE: &str = "%title%";
pub const PLACEHOLDER_DURATION: &str = "%duration%";

/// `hh:mm:ss`, with the hours field left out when it is zero.
pub fn format_duration(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs / 60) % 60;
    let seconds = total_secs % 60;
    if hours == 0 {
        format!("{minutes:02}:{seconds:02}")
    } else {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    }
}

/// Fill the row template for one track.  `%number%` is replaced everywhere,
/// the other placeholders once.
pub fn render_item(track: &Track, template: &str, position: usize) -> String {
    template
        .replace(PLACEHOLDER_NUMBER, &position.to_string())
        .replacen(PLACEHOLDER_AUTHOR, &track.artist, 1)
        .replacen(PLACEHOLDER_TITLE, &track.title, 1)
        .replacen(PLACEHOLDER_DURATION, &format_duration(track.duration_secs), 1)
}

/// Which part of the panel is visible.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Section {
    #[default]
    Login,
    Playlist,
    EmptyPlaylist,
    ApiError(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedItem {
    /// Playlist position this row activates.
    pub position: usize,
    pub markup: String,
}

#[derive(Debug, Default)]
pub struct PlaylistView {
    items: Vec<RenderedItem>,
    active: Option<usize>,
    section: Section,
}

impl PlaylistView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild every row.  Marks do not survive a re-render.
    pub fn render(&mut self, tracks: &[Track], template: &str) {
        self.items = tracks
            .iter()
            .enumerate()
            .map(|(position, track)| RenderedItem {
                position,
                markup: render_item(track, template, position),
            })
            .collect();
        self.active = None;
    }

    pub fn items(&self) -> &[RenderedItem] {
        &self.items
    }

    pub fn active(&self) -> Option<usize> {
        self.active
    }

    pub fn is_active(&self, position: usize) -> bool {
        self.active == Some(position)
    }

    /// Mark `position`, unmarking whatever was marked.  Unknown rows are
    /// ignored.
    pub fn mark_active(&mut self, position: usize) {
        if position < self.items.len() {
            self.active = Some(position);
        }
    }

    pub fn clear_active(&mut self, position: usize) {
        if self.active == Some(position) {
            self.active = None;
        }
    }

    pub fn section(&self) -> &Section {
        &self.section
    }

    pub fn show(&mut self, section: Section) {
        debug!("view: showing {:?}", section);
        self.section = section;
    }

    /// Row click.  An unmarked row becomes current and plays; the marked row
    /// pauses.  Returns the status to broadcast.
    pub fn activate<O: OutputHandle>(
        &mut self,
        position: usize,
        engine: &mut PlaybackEngine<O>,
    ) -> Result<PlaybackStatus, EngineError> {
        if self.is_active(position) {
            engine.pause();
            self.clear_active(position);
            return Ok(PlaybackStatus::Pause);
        }

        if position >= self.items.len() {
            return Err(EngineError::IndexOutOfRange {
                index: position,
                len: self.items.len(),
            });
        }

        self.active = None;
        if engine.current_index() != position {
            engine.select(position)?;
        }
        if engine.is_playing() {
            engine.stop();
        }
        engine.play();
        self.mark_active(position);
        Ok(PlaybackStatus::Playing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{MemoryOutput, OutputCall};

    const TEMPLATE: &str = "<li class=\"audio-%number%\" data-number=\"%number%\">%author% - %title% (%duration%)</li>";

    fn tracks() -> Vec<Track> {
        ["A", "B", "C"]
            .iter()
            .enumerate()
            .map(|(i, name)| Track {
                index: i,
                artist: format!("Artist {name}"),
                title: format!("Song {name}"),
                duration_secs: [5, 65, 3661][i],
                url: format!("https://cdn.example/{name}.mp3"),
            })
            .collect()
    }

    fn setup() -> (PlaylistView, PlaybackEngine<MemoryOutput>) {
        let mut view = PlaylistView::new();
        let mut engine = PlaybackEngine::new(MemoryOutput::new());
        let tracks = tracks();
        view.render(&tracks, TEMPLATE);
        engine.set_playlist(tracks);
        (view, engine)
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "00:00");
        assert_eq!(format_duration(5), "00:05");
        assert_eq!(format_duration(65), "01:05");
        assert_eq!(format_duration(3600), "01:00:00");
        assert_eq!(format_duration(3661), "01:01:01");
        assert_eq!(format_duration(90_000), "25:00:00");
    }

    #[test]
    fn test_render_substitutes_placeholders() {
        let (view, _) = setup();
        assert_eq!(view.items().len(), 3);
        assert_eq!(
            view.items()[1].markup,
            "<li class=\"audio-1\" data-number=\"1\">Artist B - Song B (01:05)</li>"
        );
        assert_eq!(view.items()[2].position, 2);
    }

    #[test]
    fn test_render_replaces_text_placeholders_once() {
        let track = &tracks()[0];
        let markup = render_item(track, "%title%|%title%|%number%|%number%", 7);
        assert_eq!(markup, "Song A|%title%|7|7");
    }

    #[test]
    fn test_activate_plays_selected_row() {
        let (mut view, mut engine) = setup();
        let status = view.activate(2, &mut engine).unwrap();
        assert_eq!(status, PlaybackStatus::Playing);
        assert_eq!(engine.current_index(), 2);
        assert!(engine.is_playing());
        assert_eq!(view.active(), Some(2));
    }

    #[test]
    fn test_activating_another_row_moves_the_mark() {
        let (mut view, mut engine) = setup();
        view.activate(0, &mut engine).unwrap();
        view.activate(1, &mut engine).unwrap();
        assert_eq!(view.active(), Some(1));
        assert!(!view.is_active(0));
        assert_eq!(engine.current_index(), 1);
        assert!(engine.is_playing());
    }

    #[test]
    fn test_activating_active_row_pauses_in_place() {
        let (mut view, mut engine) = setup();
        view.activate(1, &mut engine).unwrap();
        let log = engine.output().log();
        log.clear();

        let status = view.activate(1, &mut engine).unwrap();
        assert_eq!(status, PlaybackStatus::Pause);
        assert_eq!(engine.current_index(), 1);
        assert!(!engine.is_playing());
        assert_eq!(view.active(), None);
        assert_eq!(log.calls(), vec![OutputCall::Pause]);
    }

    #[test]
    fn test_resuming_current_row_does_not_reload() {
        let (mut view, mut engine) = setup();
        let log = engine.output().log();
        log.clear();

        view.activate(0, &mut engine).unwrap();
        assert_eq!(log.calls(), vec![OutputCall::Start]);
    }

    #[test]
    fn test_activate_unknown_row_is_rejected() {
        let (mut view, mut engine) = setup();
        assert!(view.activate(9, &mut engine).is_err());
        assert!(!engine.is_playing());
    }

    #[test]
    fn test_render_clears_mark() {
        let (mut view, mut engine) = setup();
        view.activate(1, &mut engine).unwrap();
        view.render(&tracks(), TEMPLATE);
        assert_eq!(view.active(), None);
    }
}
