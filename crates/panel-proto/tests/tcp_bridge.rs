//! The bridge over a real socket instead of the in-memory duplex.

use std::time::Duration;

use panel_proto::{
    ChannelBridge, ControlMessage, ControlPort, NamedMessage, PlaybackStatus, PresentationMessage,
    PresentationPort, Track,
};
use tokio::net::{TcpListener, TcpStream};

async fn connected_pair() -> (ControlPort, PresentationPort) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
    let control = ChannelBridge::connect(client.unwrap());
    let presentation = ChannelBridge::connect(accepted.unwrap().0);
    (control, presentation)
}

#[tokio::test]
async fn test_large_playlist_crosses_socket() {
    let (control, mut presentation) = connected_pair().await;
    presentation.register_all(ControlMessage::NAMES);

    let tracks: Vec<Track> = (0..2000)
        .map(|i| Track {
            index: i,
            artist: format!("Artist {i}"),
            title: format!("A fairly long song title number {i}"),
            duration_secs: i as u64,
            url: format!("https://cdn.test/{i}.mp3"),
        })
        .collect();
    control.send(ControlMessage::LoadPlaylist(tracks.clone()));
    control.send(ControlMessage::ShowPlaylist);

    let first = tokio::time::timeout(Duration::from_secs(2), presentation.recv())
        .await
        .unwrap();
    assert_eq!(first, Some(ControlMessage::LoadPlaylist(tracks)));
    let second = tokio::time::timeout(Duration::from_secs(2), presentation.recv())
        .await
        .unwrap();
    assert_eq!(second, Some(ControlMessage::ShowPlaylist));
}

#[tokio::test]
async fn test_closed_socket_ends_recv() {
    let (mut control, presentation) = connected_pair().await;
    control.register_all(PresentationMessage::NAMES);

    presentation.send(PresentationMessage::State(PlaybackStatus::Playing));
    drop(presentation);

    let msg = tokio::time::timeout(Duration::from_secs(2), control.recv())
        .await
        .unwrap();
    assert_eq!(msg, Some(PresentationMessage::State(PlaybackStatus::Playing)));
    let end = tokio::time::timeout(Duration::from_secs(2), control.recv())
        .await
        .unwrap();
    assert_eq!(end, None);
}
