//! Client implementation.
//!
//! The client maintains:
//! - One WebSocket to the room named in its config
//! - Snapshot history for interpolation
//! - Text events (username acks, errors) received from the room
//! - Console for user commands

use std::time::Duration;

use anyhow::Context;
use arena_shared::{
    config::ClientConfig,
    net::{AddCirclePayload, ClientMessage, ServerEvent, UsernamePayload},
    physics::Circle,
    wire,
};
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info};

use crate::{
    input::{build_command, PointerInput},
    interp::FrameBuffer,
};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Socket open, no snapshot yet.
    Connected,
    /// At least one snapshot received.
    Viewing,
    /// Server closed the socket.
    Disconnected,
}

/// What one call to [`GameClient::recv`] produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// A snapshot with this many circles was decoded and buffered.
    Snapshot(usize),
    Event(ServerEvent),
    Closed,
}

/// Headless game client.
pub struct GameClient {
    pub state: ClientState,
    pub cfg: ClientConfig,
    pub frames: FrameBuffer,
    /// Text events received from the room, oldest first.
    pub events: Vec<ServerEvent>,
    /// Last name the server accepted.
    pub accepted_name: Option<String>,

    sink: SplitSink<Socket, Message>,
    stream: SplitStream<Socket>,
}

impl GameClient {
    /// Connects to the configured room and, if a name is configured, sends it.
    pub async fn connect(cfg: &ClientConfig) -> anyhow::Result<Self> {
        let url = cfg.url();
        info!(%url, "Connecting to server");

        let (ws, _resp) = connect_async(url.as_str())
            .await
            .with_context(|| format!("connect {url}"))?;
        let (sink, stream) = ws.split();

        let mut client = Self {
            state: ClientState::Connected,
            cfg: cfg.clone(),
            frames: FrameBuffer::new(cfg.frame_history),
            events: Vec::new(),
            accepted_name: None,
            sink,
            stream,
        };

        if let Some(name) = cfg.player_name.clone() {
            client.set_username(&name).await?;
        }
        Ok(client)
    }

    pub async fn send(&mut self, msg: &ClientMessage) -> anyhow::Result<()> {
        let json = msg.to_json().context("encode message")?;
        self.send_text(&json).await
    }

    /// Sends a raw text frame. The room ignores anything it cannot parse.
    pub async fn send_text(&mut self, text: &str) -> anyhow::Result<()> {
        self.sink
            .send(Message::Text(text.to_owned().into()))
            .await
            .context("send text frame")
    }

    pub async fn add_circle(&mut self, x: f32, y: f32) -> anyhow::Result<()> {
        self.send(&ClientMessage::AddCircle(AddCirclePayload { x, y }))
            .await
    }

    /// Sends a click if the pointer was clicked, clamped to the configured
    /// arena since the wire format does not carry its bounds.
    pub async fn click(&mut self, input: PointerInput) -> anyhow::Result<bool> {
        match build_command(input, self.cfg.arena_width, self.cfg.arena_height) {
            Some(msg) => {
                self.send(&msg).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn set_username(&mut self, name: &str) -> anyhow::Result<()> {
        self.send(&ClientMessage::SetUsername(UsernamePayload {
            name: name.to_string(),
        }))
        .await
    }

    /// Waits for the next frame from the room.
    pub async fn recv(&mut self) -> anyhow::Result<Incoming> {
        loop {
            let Some(frame) = self.stream.next().await else {
                self.state = ClientState::Disconnected;
                return Ok(Incoming::Closed);
            };
            match frame.context("read frame")? {
                Message::Binary(data) => {
                    let circles = wire::decode(&data);
                    if data.len() % wire::RECORD_LEN != 0 {
                        debug!(len = data.len(), "Snapshot has a trailing partial record");
                    }
                    let count = circles.len();
                    self.frames.push(circles);
                    self.state = ClientState::Viewing;
                    return Ok(Incoming::Snapshot(count));
                }
                Message::Text(text) => match ServerEvent::parse(text.as_bytes()) {
                    Ok(event) => {
                        if let ServerEvent::UsernameAccepted(p) = &event {
                            self.accepted_name = Some(p.name.clone());
                        }
                        self.events.push(event.clone());
                        return Ok(Incoming::Event(event));
                    }
                    Err(e) => debug!(error = %e, "Ignoring unknown text frame"),
                },
                Message::Close(_) => {
                    self.state = ClientState::Disconnected;
                    return Ok(Incoming::Closed);
                }
                _ => {}
            }
        }
    }

    /// Like [`recv`](Self::recv) but gives up after `timeout`.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> anyhow::Result<Option<Incoming>> {
        match tokio::time::timeout(timeout, self.recv()).await {
            Ok(res) => res.map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Reads until a snapshot satisfying `pred` arrives, the socket closes,
    /// or `timeout` elapses.
    pub async fn wait_for_snapshot<F>(
        &mut self,
        timeout: Duration,
        mut pred: F,
    ) -> anyhow::Result<Option<Vec<Circle>>>
    where
        F: FnMut(&[Circle]) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(tokio::time::Instant::now());
            match self.recv_timeout(left).await? {
                Some(Incoming::Snapshot(_)) => {
                    if let Some(frame) = self.frames.last_frame() {
                        if pred(&frame.circles) {
                            return Ok(Some(frame.circles.clone()));
                        }
                    }
                }
                Some(Incoming::Event(_)) => {}
                Some(Incoming::Closed) | None => return Ok(None),
            }
        }
    }

    /// Reads until a text event arrives, skipping snapshots.
    pub async fn wait_for_event(&mut self, timeout: Duration) -> anyhow::Result<Option<ServerEvent>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(tokio::time::Instant::now());
            match self.recv_timeout(left).await? {
                Some(Incoming::Event(event)) => return Ok(Some(event)),
                Some(Incoming::Snapshot(_)) => {}
                Some(Incoming::Closed) | None => return Ok(None),
            }
        }
    }

    /// Sends a close frame and flushes.
    pub async fn close(mut self) -> anyhow::Result<()> {
        self.sink.send(Message::Close(None)).await.ok();
        self.sink.close().await.ok();
        Ok(())
    }

    /// Processes a console command line.
    pub async fn exec_console(&mut self, line: &str) -> anyhow::Result<Vec<String>> {
        let mut parts = line.split_whitespace();
        let Some(cmd) = parts.next() else {
            return Ok(Vec::new());
        };
        let args: Vec<&str> = parts.collect();
        let mut out = Vec::new();

        match cmd {
            "add" => {
                let (Some(x), Some(y)) = (
                    args.first().and_then(|v| v.parse::<f32>().ok()),
                    args.get(1).and_then(|v| v.parse::<f32>().ok()),
                ) else {
                    out.push("Usage: add <x> <y>".to_string());
                    return Ok(out);
                };
                self.click(PointerInput {
                    x,
                    y,
                    clicked: true,
                })
                .await?;
                out.push(format!("Requested circle at ({x}, {y})"));
            }
            "name" => {
                if args.is_empty() {
                    out.push("Usage: name <username>".to_string());
                } else {
                    let name = args.join(" ");
                    self.set_username(&name).await?;
                    out.push(format!("Requested name {name:?}"));
                }
            }
            "status" => {
                out.push(format!("State: {:?}", self.state));
                out.push(format!("Room: {} ({})", self.cfg.room, self.cfg.game));
                out.push(format!("Frames received: {}", self.frames.received()));
                if let Some(frame) = self.frames.last_frame() {
                    out.push(format!("Circles: {}", frame.circles.len()));
                }
                if let Some(name) = &self.accepted_name {
                    out.push(format!("Name: {name}"));
                }
            }
            "help" => {
                out.push("Commands:".to_string());
                out.push("  add <x> <y>   - Drop a circle".to_string());
                out.push("  name <name>   - Set username".to_string());
                out.push("  status        - Show client status".to_string());
                out.push("  quit          - Exit client".to_string());
            }
            _ => out.push(format!("Unknown command: {cmd}")),
        }

        Ok(out)
    }
}
