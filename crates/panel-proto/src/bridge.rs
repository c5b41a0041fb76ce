//! Ordered, unacknowledged named-message channel between the two contexts.
//!
//! ```text
//!   Port::send ──► out queue ──► writer_task ──► stream ──► reader_task ──► in queue ──► Port::recv
//! ```
//!
//! Each direction is its own byte stream, so ordering holds per direction
//! only.  Nothing is acknowledged or retried.  A message whose name has no
//! registered handler at the receiving port is dropped on arrival; the sender
//! cannot observe this.

use std::collections::HashSet;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::protocol::{decode_frame, encode_frame, ControlMessage, Decoded, NamedMessage, PresentationMessage};

/// Buffer size of the in-memory duplex used by [`ChannelBridge::in_process`].
const IN_PROCESS_BUFFER: usize = 64 * 1024;

/// The control surface's end: sends [`ControlMessage`], receives [`PresentationMessage`].
pub type ControlPort = Port<ControlMessage, PresentationMessage>;
/// The presentation surface's end: sends [`PresentationMessage`], receives [`ControlMessage`].
pub type PresentationPort = Port<PresentationMessage, ControlMessage>;

/// Factory for connected ports.
pub struct ChannelBridge;

impl ChannelBridge {
    /// Two ports joined by an in-memory byte stream.  Messages are still
    /// serialised, so nothing is shared between the contexts but bytes.
    pub fn in_process() -> (ControlPort, PresentationPort) {
        let (control_io, presentation_io) = tokio::io::duplex(IN_PROCESS_BUFFER);
        (Self::connect(control_io), Self::connect(presentation_io))
    }

    /// Run a port over any byte stream, e.g. a `TcpStream`.
    pub fn connect<S, Out, In>(stream: S) -> Port<Out, In>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
        Out: NamedMessage,
        In: NamedMessage,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (out_tx, out_rx) = mpsc::unbounded_channel::<Out>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<In>();

        tokio::spawn(writer_task(write_half, out_rx));
        tokio::spawn(reader_task(read_half, in_tx));

        Port {
            sender: PortSender { tx: out_tx },
            in_rx,
            handlers: HashSet::new(),
        }
    }
}

/// Cloneable sending half of a [`Port`].
#[derive(Debug)]
pub struct PortSender<Out> {
    tx: mpsc::UnboundedSender<Out>,
}

impl<Out> Clone for PortSender<Out> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<Out: NamedMessage> PortSender<Out> {
    /// Fire and forget.  A closed channel is logged, never reported.
    pub fn send(&self, msg: Out) {
        let name = msg.name();
        debug!("bridge: send {}", name);
        if self.tx.send(msg).is_err() {
            debug!("bridge: channel closed, '{}' lost", name);
        }
    }
}

/// One end of the bridge, owned by a single context.
pub struct Port<Out, In> {
    sender: PortSender<Out>,
    in_rx: mpsc::UnboundedReceiver<In>,
    handlers: HashSet<&'static str>,
}

impl<Out: NamedMessage, In: NamedMessage> Port<Out, In> {
    pub fn send(&self, msg: Out) {
        self.sender.send(msg);
    }

    pub fn sender(&self) -> PortSender<Out> {
        self.sender.clone()
    }

    /// Start accepting messages carrying `name`.
    pub fn register(&mut self, name: &'static str) {
        if !In::NAMES.contains(&name) {
            warn!("bridge: registering unknown message name '{}'", name);
        }
        self.handlers.insert(name);
    }

    pub fn register_all(&mut self, names: &[&'static str]) {
        for name in names {
            self.register(name);
        }
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.handlers.contains(name)
    }

    /// Next message with a registered handler.  Unhandled messages are
    /// discarded.  Returns `None` once the other side is gone.
    pub async fn recv(&mut self) -> Option<In> {
        loop {
            let msg = self.in_rx.recv().await?;
            if self.handlers.contains(msg.name()) {
                debug!("bridge: deliver {}", msg.name());
                return Some(msg);
            }
            debug!("bridge: no handler for '{}', dropped", msg.name());
        }
    }
}

// ── reader task ───────────────────────────────────────────────────────────────

async fn reader_task<R, In>(mut reader: R, in_tx: mpsc::UnboundedSender<In>)
where
    R: AsyncRead + Unpin,
    In: NamedMessage,
{
    let mut tmp = [0u8; 4096];
    let mut read_buf: Vec<u8> = Vec::new();

    loop {
        match reader.read(&mut tmp).await {
            Ok(0) => {
                debug!("bridge reader: stream closed");
                break;
            }
            Ok(n) => {
                read_buf.extend_from_slice(&tmp[..n]);

                loop {
                    match decode_frame::<In>(&read_buf) {
                        Ok(Decoded::Incomplete) => break,
                        Ok(Decoded::Message(msg, consumed)) => {
                            read_buf.drain(..consumed);
                            if in_tx.send(msg).is_err() {
                                debug!("bridge reader: port dropped");
                                return;
                            }
                        }
                        Ok(Decoded::Malformed(reason, consumed)) => {
                            read_buf.drain(..consumed);
                            warn!("bridge reader: skipping malformed frame: {}", reason);
                        }
                        Err(e) => {
                            warn!("bridge reader: {}", e);
                            return;
                        }
                    }
                }
            }
            Err(e) => {
                warn!("bridge reader: read error: {}", e);
                break;
            }
        }
    }
}

// ── writer task ───────────────────────────────────────────────────────────────

async fn writer_task<W, Out>(mut writer: W, mut out_rx: mpsc::UnboundedReceiver<Out>)
where
    W: AsyncWrite + Unpin,
    Out: NamedMessage,
{
    while let Some(msg) = out_rx.recv().await {
        let encoded = match encode_frame(&msg) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("bridge writer: cannot encode '{}': {}", msg.name(), e);
                continue;
            }
        };
        if let Err(e) = writer.write_all(&encoded).await {
            warn!("bridge writer: write error: {}", e);
            break;
        }
    }
    let _ = writer.shutdown().await;
    debug!("bridge writer: task exiting");
}
