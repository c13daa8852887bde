//! WebSocket transport.
//!
//! Each accepted socket gets a connection id, joins the room named in the
//! upgrade request's query (`?room=<key>&game=<tag>`), and is then served by
//! two halves:
//! - a writer task draining the connection's bounded outbound queue,
//! - a reader loop that parses text frames into [`ClientMessage`]s and
//!   forwards them to the room.
//!
//! Whichever half ends first ends the connection, and the connection is
//! always detached from its room on the way out.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use arena_shared::{
    config::ServerConfig,
    net::{ClientMessage, ConnectionId, ServerEvent},
};
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use thiserror::Error;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::mpsc,
};
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::{
        self,
        handshake::server::{ErrorResponse, Request, Response},
        Message,
    },
    WebSocketStream,
};
use tracing::{debug, info, warn};

use crate::{
    registry::Registry,
    room::{Outbound, RoomHandle},
};

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsStream = SplitStream<WebSocketStream<TcpStream>>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket handshake failed: {0}")]
    Handshake(#[source] tungstenite::Error),
    #[error("websocket error: {0}")]
    Socket(#[from] tungstenite::Error),
}

/// Room key and game tag requested by a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinParams {
    pub room: String,
    pub game: String,
}

impl JoinParams {
    /// Reads `room` and `game` from a URL query string, percent-decoding
    /// both. Missing or empty values fall back to the configured defaults.
    /// The first occurrence of a name wins.
    pub fn from_query(query: Option<&str>, cfg: &ServerConfig) -> Self {
        let mut room = None;
        let mut game = None;
        for (name, value) in form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
            let slot = match &*name {
                "room" => &mut room,
                "game" => &mut game,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }
        JoinParams {
            room: room
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| cfg.default_room.clone()),
            game: game
                .filter(|g| !g.is_empty())
                .unwrap_or_else(|| cfg.default_game.clone()),
        }
    }
}

/// Accepts connections forever, one task each.
pub async fn serve(listener: TcpListener, registry: Arc<Registry>) -> anyhow::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await.context("tcp accept")?;
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer, registry).await {
                warn!(%peer, error = %e, "Connection ended with error");
            }
        });
    }
}

/// Serves one socket from upgrade to detach.
pub async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    registry: Arc<Registry>,
) -> Result<(), TransportError> {
    let mut query = None;
    let ws = accept_hdr_async(
        stream,
        |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            query = req.uri().query().map(str::to_owned);
            Ok(resp)
        },
    )
    .await
    .map_err(TransportError::Handshake)?;

    let params = JoinParams::from_query(query.as_deref(), registry.config());
    let conn = ConnectionId::new_unique();
    let (mut sink, mut stream) = ws.split();
    let (out_tx, out_rx) = mpsc::channel(registry.config().outbound_queue.max(1));

    let room = match registry.join(&params.room, &params.game, conn, out_tx).await {
        Ok(room) => room,
        Err(e) => {
            warn!(%peer, %conn, room = %params.room, game = %params.game, error = %e, "Join rejected");
            match ServerEvent::error(e.to_string()).to_json() {
                Ok(text) => sink.send(Message::Text(text.into())).await?,
                Err(e) => warn!(error = %e, "Failed to encode error event"),
            }
            let _ = sink.close().await;
            return Ok(());
        }
    };
    info!(%peer, %conn, room = %room.key(), game = %room.kind(), "Connection attached");

    let mut writer = tokio::spawn(write_loop(sink, out_rx, conn));
    let result = tokio::select! {
        res = read_loop(&mut stream, &room, conn) => res,
        _ = &mut writer => {
            debug!(%conn, "Outbound closed");
            Ok(())
        }
    };

    room.detach(conn).await;
    writer.abort();
    info!(%peer, %conn, room = %room.key(), "Connection detached");
    result
}

async fn read_loop(
    stream: &mut WsStream,
    room: &RoomHandle,
    conn: ConnectionId,
) -> Result<(), TransportError> {
    while let Some(frame) = stream.next().await {
        let raw = match frame? {
            Message::Text(text) => text.as_bytes().to_vec(),
            Message::Binary(bin) => bin.to_vec(),
            Message::Close(_) => break,
            _ => continue,
        };
        match ClientMessage::parse(&raw) {
            Ok(msg) => {
                if room.send_message(conn, msg).await.is_err() {
                    break;
                }
            }
            Err(e) => debug!(%conn, error = %e, "Dropping malformed message"),
        }
    }
    Ok(())
}

async fn write_loop(mut sink: WsSink, mut outbound: mpsc::Receiver<Outbound>, conn: ConnectionId) {
    while let Some(out) = outbound.recv().await {
        let frame = match out {
            Outbound::Snapshot(bytes) => Message::Binary(bytes),
            Outbound::Event(ev) => match ev.to_json() {
                Ok(text) => Message::Text(text.into()),
                Err(e) => {
                    warn!(%conn, error = %e, "Failed to encode event");
                    continue;
                }
            },
        };
        if let Err(e) = sink.send(frame).await {
            debug!(%conn, error = %e, "Write failed");
            return;
        }
    }
    let _ = sink.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_defaults_and_overrides() {
        let cfg = ServerConfig::default();
        assert_eq!(
            JoinParams::from_query(None, &cfg),
            JoinParams {
                room: "default".into(),
                game: "balls".into()
            }
        );
        let p = JoinParams::from_query(Some("game=duel&room=r1&x=1"), &cfg);
        assert_eq!((p.room.as_str(), p.game.as_str()), ("r1", "duel"));
        let p = JoinParams::from_query(Some("room=&game"), &cfg);
        assert_eq!((p.room.as_str(), p.game.as_str()), ("default", "balls"));
    }

    #[test]
    fn query_values_are_percent_decoded() {
        let cfg = ServerConfig::default();
        let p = JoinParams::from_query(Some("room=my%20room&game=balls"), &cfg);
        assert_eq!(p.room, "my room");
        let p = JoinParams::from_query(Some("room=a+b%26c%3Dd%25"), &cfg);
        assert_eq!((p.room.as_str(), p.game.as_str()), ("a b&c=d%", "balls"));
    }
}
