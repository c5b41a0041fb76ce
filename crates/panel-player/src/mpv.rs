//! mpv-backed [`OutputHandle`].
//!
//! Architecture:
//!
//! ```text
//!   MpvOutput (engine side, non-blocking)
//!         │  command_tx
//!         ▼
//!   output_task ──► MpvHandle::send ──► writer_task ──► socket
//!         ▲                                              │
//!         └──────── mpv events ◄── reader_task ◄─────────┘
//!         │
//!         ▼
//!   OutputEvent (stamped with session) ──► presentation loop
//! ```
//!
//! Every `loadfile` reply carries the `playlist_entry_id` mpv assigned, and
//! every `start-file` / `end-file` names the entry it concerns, so the
//! [`SessionTracker`] maps entries back to the sessions handed out by `load`.
//! A redirect ends one entry and starts another; the new entry inherits the
//! redirected session.  The output task records a mapping before it looks at
//! any event queued behind the reply, and a rejected `loadfile` is reported
//! as an error for its session.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

#[cfg(unix)]
use tokio::net::UnixStream;

#[cfg(windows)]
use tokio::net::windows::named_pipe::ClientOptions;

use crate::error::PlaybackError;
use crate::output::{OutputEvent, OutputHandle, SessionId};

static NEXT_REQ_ID: AtomicU64 = AtomicU64::new(1);

const IPC_TIMEOUT: tokio::time::Duration = tokio::time::Duration::from_secs(5);

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<anyhow::Result<Value>>>>>;

struct PendingRequest {
    req_id: u64,
    payload: String, // serialised JSON line (already has '\n')
    reply: oneshot::Sender<anyhow::Result<Value>>,
}

/// An unsolicited mpv event (no request_id).
#[derive(Debug, Clone)]
pub struct MpvEvent {
    pub raw: Value,
}

impl MpvEvent {
    /// e.g. "end-file", "start-file", "file-loaded".
    pub fn event_name(&self) -> Option<&str> {
        self.raw.get("event")?.as_str()
    }

    /// `reason` of an `end-file` event: "eof", "stop", "quit", "error", "redirect".
    pub fn end_reason(&self) -> Option<&str> {
        self.raw.get("reason")?.as_str()
    }

    pub fn file_error(&self) -> Option<&str> {
        self.raw.get("file_error")?.as_str()
    }

    /// Playlist entry a `start-file` / `end-file` refers to.
    pub fn playlist_entry_id(&self) -> Option<i64> {
        self.raw.get("playlist_entry_id")?.as_i64()
    }
}

// ── handle ────────────────────────────────────────────────────────────────────

/// Cloneable handle to the mpv writer task.
#[derive(Clone)]
pub struct MpvHandle {
    tx: mpsc::Sender<PendingRequest>,
}

impl MpvHandle {
    pub async fn send(&self, command: Value) -> anyhow::Result<Value> {
        let req_id = NEXT_REQ_ID.fetch_add(1, Ordering::Relaxed);
        let msg = json!({ "command": command, "request_id": req_id });
        let mut raw = serde_json::to_string(&msg)?;
        raw.push('\n');

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PendingRequest {
                req_id,
                payload: raw,
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("mpv writer task gone"))?;

        tokio::time::timeout(IPC_TIMEOUT, reply_rx)
            .await
            .map_err(|_| anyhow::anyhow!("mpv IPC timeout for req={}", req_id))?
            .map_err(|_| anyhow::anyhow!("mpv reply channel dropped req={}", req_id))?
    }
}

// ── driver ────────────────────────────────────────────────────────────────────

/// Owns the mpv child process.
pub struct MpvDriver {
    socket_name: String,
    process: Option<tokio::process::Child>,
}

impl Default for MpvDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MpvDriver {
    pub fn new() -> Self {
        Self {
            socket_name: panel_proto::platform::mpv_socket_name(),
            process: None,
        }
    }

    pub async fn kill(&mut self) {
        if let Some(mut p) = self.process.take() {
            let _ = p.kill().await;
        }
    }

    fn spawn_process(&mut self) -> anyhow::Result<()> {
        let mpv_binary = panel_proto::platform::find_mpv_binary()
            .ok_or_else(|| anyhow::anyhow!("mpv binary not found"))?;
        info!("mpv: spawning {}", mpv_binary.display());

        let child = tokio::process::Command::new(mpv_binary)
            .arg("--no-video")
            .arg("--idle=yes")
            .arg("--keep-open=no")
            .arg(panel_proto::platform::mpv_socket_arg())
            .arg("--quiet")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        self.process = Some(child);
        Ok(())
    }

    /// Start mpv and connect to its IPC endpoint.  Unsolicited events are
    /// forwarded to `event_tx`.
    #[cfg(unix)]
    pub async fn spawn_and_connect(
        &mut self,
        event_tx: mpsc::Sender<MpvEvent>,
    ) -> anyhow::Result<MpvHandle> {
        self.kill().await;

        let socket_path = std::path::PathBuf::from(&self.socket_name);
        let _ = tokio::fs::remove_file(&socket_path).await;

        self.spawn_process()?;

        for _ in 0..50 {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            if socket_path.exists() {
                break;
            }
        }
        if !socket_path.exists() {
            anyhow::bail!("mpv IPC socket did not appear");
        }

        let stream = UnixStream::connect(&socket_path).await?;
        info!("mpv: connected to IPC socket");
        let (read_half, write_half) = stream.into_split();
        Ok(start_io_tasks(read_half, write_half, event_tx))
    }

    #[cfg(windows)]
    pub async fn spawn_and_connect(
        &mut self,
        event_tx: mpsc::Sender<MpvEvent>,
    ) -> anyhow::Result<MpvHandle> {
        self.kill().await;
        self.spawn_process()?;

        let pipe_path = format!(r"\\.\pipe\{}", self.socket_name);
        for _ in 0..50 {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            if let Ok(client) = ClientOptions::new().open(&pipe_path) {
                info!("mpv: connected to named pipe");
                let (read_half, write_half) = tokio::io::split(client);
                return Ok(start_io_tasks(read_half, write_half, event_tx));
            }
        }
        anyhow::bail!("mpv named pipe did not appear")
    }
}

fn start_io_tasks<R, W>(read_half: R, write_half: W, event_tx: mpsc::Sender<MpvEvent>) -> MpvHandle
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
    W: tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    // req_id → reply channel.  Writer inserts, reader resolves.
    let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
    let (cmd_tx, cmd_rx) = mpsc::channel::<PendingRequest>(64);

    tokio::spawn(writer_task(write_half, cmd_rx, pending.clone()));
    tokio::spawn(reader_task(BufReader::new(read_half), pending, event_tx));

    MpvHandle { tx: cmd_tx }
}

// ── reader task ───────────────────────────────────────────────────────────────

async fn reader_task<R>(mut reader: BufReader<R>, pending: PendingMap, event_tx: mpsc::Sender<MpvEvent>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("mpv reader: connection closed");
                fail_pending(&pending, "mpv IPC connection closed").await;
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let val: Value = match serde_json::from_str(trimmed) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!("mpv reader: invalid json '{}': {}", trimmed, e);
                        continue;
                    }
                };

                if let Some(req_id) = val.get("request_id").and_then(|v| v.as_u64()) {
                    let mut map = pending.lock().await;
                    if let Some(tx) = map.remove(&req_id) {
                        let result = if val["error"].as_str() == Some("success") {
                            Ok(val)
                        } else {
                            let err = val["error"].as_str().unwrap_or("unknown error").to_string();
                            Err(anyhow::anyhow!("mpv error: {}", err))
                        };
                        let _ = tx.send(result);
                    } else {
                        debug!("mpv reader: response for unknown req={}", req_id);
                    }
                } else {
                    debug!("mpv reader: event {}", trimmed);
                    if event_tx.send(MpvEvent { raw: val }).await.is_err() {
                        break;
                    }
                }
            }
            Err(e) => {
                warn!("mpv reader: read error: {}", e);
                fail_pending(&pending, "mpv IPC read error").await;
                break;
            }
        }
    }
}

async fn fail_pending(pending: &PendingMap, reason: &str) {
    let mut map = pending.lock().await;
    for (_, tx) in map.drain() {
        let _ = tx.send(Err(anyhow::anyhow!("{}", reason)));
    }
}

// ── writer task ───────────────────────────────────────────────────────────────

async fn writer_task<W>(mut writer: W, mut rx: mpsc::Receiver<PendingRequest>, pending: PendingMap)
where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(req) = rx.recv().await {
        // Register before writing so the reader can match the reply.
        pending.lock().await.insert(req.req_id, req.reply);
        debug!("mpv writer: send req={} payload={}", req.req_id, req.payload.trim());
        if let Err(e) = writer.write_all(req.payload.as_bytes()).await {
            warn!("mpv writer: write error: {}", e);
            if let Some(tx) = pending.lock().await.remove(&req.req_id) {
                let _ = tx.send(Err(anyhow::anyhow!("mpv write error: {}", e)));
            }
            break;
        }
    }
    debug!("mpv writer: task exiting");
}

// ── output adapter ────────────────────────────────────────────────────────────

enum OutputCommand {
    Load { url: String, session: SessionId },
    Raw(Value),
}

/// Engine-facing side of mpv.  Commands are queued and executed in order by a
/// background task, so no engine call ever waits on IPC.
pub struct MpvOutput {
    command_tx: mpsc::UnboundedSender<OutputCommand>,
    session: SessionId,
}

impl MpvOutput {
    /// Wire a connected mpv to the engine.  Spawns the task that runs the
    /// queued commands and translates mpv events into [`OutputEvent`]s on
    /// `output_tx`.
    pub fn new(
        handle: MpvHandle,
        mpv_events: mpsc::Receiver<MpvEvent>,
        output_tx: mpsc::Sender<OutputEvent>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        tokio::spawn(output_task(handle, command_rx, mpv_events, output_tx));
        Self {
            command_tx,
            session: 0,
        }
    }

    fn enqueue(&self, command: OutputCommand) {
        if self.command_tx.send(command).is_err() {
            warn!("mpv: output task gone");
        }
    }

    fn raw(&self, command: Value) {
        self.enqueue(OutputCommand::Raw(command));
    }
}

impl OutputHandle for MpvOutput {
    fn load(&mut self, url: &str) -> SessionId {
        self.session += 1;
        self.raw(json!(["set_property", "pause", true]));
        self.enqueue(OutputCommand::Load {
            url: url.to_string(),
            session: self.session,
        });
        self.session
    }

    fn start(&mut self) {
        self.raw(json!(["set_property", "pause", false]));
    }

    fn pause(&mut self) {
        self.raw(json!(["set_property", "pause", true]));
    }

    fn reset(&mut self) {
        self.raw(json!(["set_property", "pause", true]));
        self.raw(json!(["seek", 0, "absolute"]));
    }
}

/// `playlist_entry_id` from a successful `loadfile` reply.
fn loaded_entry_id(reply: &Value) -> Option<i64> {
    reply.get("data")?.get("playlist_entry_id")?.as_i64()
}

/// Maps mpv playlist entries to output sessions.
#[derive(Debug, Default)]
pub struct SessionTracker {
    entries: HashMap<i64, SessionId>,
    /// Session whose next `start-file` has no known entry yet: a redirect
    /// target, or a load whose reply carried no entry id.
    unbound: Option<SessionId>,
    /// Session of the last `start-file`, for events without an entry id.
    current: Option<SessionId>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the reply to the `loadfile` issued for `session`.
    pub fn loaded(&mut self, entry_id: Option<i64>, session: SessionId) {
        match entry_id {
            Some(id) => {
                self.entries.insert(id, session);
            }
            None => self.unbound = Some(session),
        }
    }

    pub fn translate(&mut self, event: &MpvEvent) -> Option<OutputEvent> {
        match event.event_name()? {
            "start-file" => {
                let entry = event.playlist_entry_id();
                let session = entry
                    .and_then(|id| self.entries.get(&id).copied())
                    .or_else(|| self.unbound.take());
                if let (Some(id), Some(session)) = (entry, session) {
                    self.entries.insert(id, session);
                }
                self.current = session;
                None
            }
            "end-file" => {
                let entry = event.playlist_entry_id();
                let session = match entry {
                    Some(id) => self.entries.remove(&id),
                    None => self.current,
                };
                let Some(session) = session else {
                    debug!("mpv: end-file for unknown entry {:?}", entry);
                    return None;
                };
                match event.end_reason()? {
                    "redirect" => {
                        self.unbound = Some(session);
                        None
                    }
                    "eof" => Some(OutputEvent::Ended { session }),
                    "error" => Some(OutputEvent::Error {
                        session,
                        error: PlaybackError::classify(event.file_error().unwrap_or("unknown error")),
                    }),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

async fn output_task(
    handle: MpvHandle,
    mut command_rx: mpsc::UnboundedReceiver<OutputCommand>,
    mut mpv_events: mpsc::Receiver<MpvEvent>,
    output_tx: mpsc::Sender<OutputEvent>,
) {
    let mut tracker = SessionTracker::new();
    loop {
        let translated = tokio::select! {
            biased;
            event = mpv_events.recv() => match event {
                Some(event) => tracker.translate(&event),
                None => break,
            },
            command = command_rx.recv() => match command {
                Some(OutputCommand::Load { url, session }) => {
                    match handle.send(json!(["loadfile", url, "replace"])).await {
                        Ok(reply) => {
                            tracker.loaded(loaded_entry_id(&reply), session);
                            None
                        }
                        Err(e) => {
                            warn!("mpv: loadfile for session {} failed: {}", session, e);
                            Some(OutputEvent::Error {
                                session,
                                error: PlaybackError::classify(&e.to_string()),
                            })
                        }
                    }
                }
                Some(OutputCommand::Raw(command)) => {
                    // Seeking an idle player fails routinely.
                    if let Err(e) = handle.send(command.clone()).await {
                        debug!("mpv: command {} failed: {}", command, e);
                    }
                    None
                }
                None => break,
            },
        };
        if let Some(output_event) = translated {
            debug!("mpv: {:?}", output_event);
            if output_tx.send(output_event).await.is_err() {
                break;
            }
        }
    }
    debug!("mpv: output task exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(raw: Value) -> MpvEvent {
        MpvEvent { raw }
    }

    fn start_file(entry: i64) -> MpvEvent {
        event(json!({"event": "start-file", "playlist_entry_id": entry}))
    }

    fn end_file(entry: i64, reason: &str) -> MpvEvent {
        event(json!({"event": "end-file", "reason": reason, "playlist_entry_id": entry}))
    }

    #[test]
    fn test_end_file_is_stamped_with_its_entry_session() {
        let mut tracker = SessionTracker::new();
        tracker.loaded(Some(1), 1);
        assert_eq!(tracker.translate(&start_file(1)), None);
        assert_eq!(
            tracker.translate(&end_file(1, "eof")),
            Some(OutputEvent::Ended { session: 1 })
        );
    }

    #[test]
    fn test_redirected_entry_keeps_session() {
        let mut tracker = SessionTracker::new();
        tracker.loaded(Some(4), 1);
        tracker.translate(&start_file(4));
        assert_eq!(tracker.translate(&end_file(4, "redirect")), None);
        tracker.translate(&start_file(5));
        assert_eq!(
            tracker.translate(&end_file(5, "eof")),
            Some(OutputEvent::Ended { session: 1 })
        );
    }

    #[test]
    fn test_redirect_without_entry_ids() {
        let mut tracker = SessionTracker::new();
        tracker.loaded(None, 1);
        for raw in [
            json!({"event": "start-file"}),
            json!({"event": "end-file", "reason": "redirect"}),
            json!({"event": "start-file"}),
        ] {
            assert_eq!(tracker.translate(&event(raw)), None);
        }
        assert_eq!(
            tracker.translate(&event(json!({"event": "end-file", "reason": "eof"}))),
            Some(OutputEvent::Ended { session: 1 })
        );
    }

    #[test]
    fn test_late_end_of_replaced_entry_keeps_old_session() {
        let mut tracker = SessionTracker::new();
        tracker.loaded(Some(1), 1);
        tracker.translate(&start_file(1));
        tracker.loaded(Some(2), 2);
        assert_eq!(
            tracker.translate(&end_file(1, "eof")),
            Some(OutputEvent::Ended { session: 1 })
        );
        assert_eq!(tracker.translate(&end_file(1, "eof")), None);
    }

    #[test]
    fn test_replaced_file_is_not_reported() {
        let mut tracker = SessionTracker::new();
        tracker.loaded(Some(1), 1);
        tracker.translate(&start_file(1));
        assert_eq!(tracker.translate(&end_file(1, "stop")), None);
    }

    #[test]
    fn test_error_reason_is_classified() {
        let mut tracker = SessionTracker::new();
        tracker.loaded(Some(9), 3);
        let translated = tracker.translate(&event(json!({
            "event": "end-file",
            "reason": "error",
            "playlist_entry_id": 9,
            "file_error": "unrecognized file format"
        })));
        assert_eq!(
            translated,
            Some(OutputEvent::Error {
                session: 3,
                error: PlaybackError::UnsupportedFormat("unrecognized file format".into()),
            })
        );
    }

    #[test]
    fn test_property_changes_are_ignored() {
        let mut tracker = SessionTracker::new();
        let raw = json!({"event": "property-change", "id": 1, "name": "pause", "data": true});
        assert_eq!(tracker.translate(&event(raw)), None);
    }

    #[test]
    fn test_loadfile_reply_entry_id() {
        let reply = json!({"data": {"playlist_entry_id": 12}, "request_id": 3, "error": "success"});
        assert_eq!(loaded_entry_id(&reply), Some(12));
        assert_eq!(loaded_entry_id(&json!({"error": "success"})), None);
    }

    /// Answers IPC requests the way mpv does: `loadfile` gets a fresh entry
    /// id unless its URL starts with `bad:`.
    fn fake_mpv() -> MpvHandle {
        let (tx, mut rx) = mpsc::channel::<PendingRequest>(16);
        tokio::spawn(async move {
            let mut next_entry = 1;
            while let Some(req) = rx.recv().await {
                let request: Value = serde_json::from_str(req.payload.trim()).unwrap();
                let command = &request["command"];
                let reply = if command[0] == "loadfile" {
                    if command[1].as_str().unwrap_or("").starts_with("bad:") {
                        Err(anyhow::anyhow!("mpv error: invalid parameter"))
                    } else {
                        next_entry += 1;
                        Ok(json!({"data": {"playlist_entry_id": next_entry - 1}, "error": "success"}))
                    }
                } else {
                    Ok(json!({"error": "success"}))
                };
                let _ = req.reply.send(reply);
            }
        });
        MpvHandle { tx }
    }

    #[tokio::test]
    async fn test_redirected_track_end_reaches_engine_session() {
        let (event_tx, event_rx) = mpsc::channel(16);
        let (output_tx, mut output_rx) = mpsc::channel(16);
        let mut output = MpvOutput::new(fake_mpv(), event_rx, output_tx);

        let session = output.load("https://cdn.example/playlist.m3u");
        output.start();
        // Let the loadfile reply land before mpv reports on the entry.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        for ev in [
            start_file(1),
            end_file(1, "redirect"),
            start_file(2),
            end_file(2, "eof"),
        ] {
            event_tx.send(ev).await.unwrap();
        }

        let received = tokio::time::timeout(std::time::Duration::from_secs(1), output_rx.recv())
            .await
            .unwrap();
        assert_eq!(received, Some(OutputEvent::Ended { session }));
    }

    #[tokio::test]
    async fn test_rejected_loadfile_reports_error() {
        let (_event_tx, event_rx) = mpsc::channel(16);
        let (output_tx, mut output_rx) = mpsc::channel(16);
        let mut output = MpvOutput::new(fake_mpv(), event_rx, output_tx);

        output.load("https://cdn.example/a.mp3");
        let session = output.load("bad:track");

        let received = tokio::time::timeout(std::time::Duration::from_secs(1), output_rx.recv())
            .await
            .unwrap();
        match received {
            Some(OutputEvent::Error { session: s, .. }) => assert_eq!(s, session),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
