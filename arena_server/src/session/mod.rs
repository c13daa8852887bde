//! Game sessions.
//!
//! A [`GameSession`] is the closed set of simulation variants a room can
//! drive. The variant is resolved once from its tag when the room is created;
//! after that the room only talks to the uniform lifecycle below.
//!
//! Sessions have no tick source of their own. `start` arms the session and the
//! owning room's loop calls `update` on its simulation interval while the
//! session is running, so session state is only ever touched from that loop.

mod balls;
mod duel;

use std::{fmt, str::FromStr};

use arena_shared::{
    config::ServerConfig,
    net::{ClientMessage, ConnectionId, MessageError},
    physics::EngineError,
};
use bytes::Bytes;
use thiserror::Error;

pub use balls::BallsGame;
pub use duel::{DuelGame, DUEL_CAPACITY, DUEL_DRAIN_EVERY, DUEL_START_COUNTER};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("unknown game type {0:?}")]
    UnknownGame(String),
    #[error("game type {0:?} is not implemented yet")]
    NotImplemented(&'static str),
    #[error("room is full ({capacity} players)")]
    RoomFull { capacity: usize },
    #[error(transparent)]
    Message(#[from] MessageError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Variant tags accepted at room creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameKind {
    Balls,
    Duel,
}

impl GameKind {
    pub fn as_str(self) -> &'static str {
        match self {
            GameKind::Balls => "balls",
            GameKind::Duel => "duel",
        }
    }
}

impl fmt::Display for GameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameKind {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "balls" => Ok(GameKind::Balls),
            "duel" => Ok(GameKind::Duel),
            "colors" => Err(SessionError::NotImplemented("colors")),
            other => Err(SessionError::UnknownGame(other.to_string())),
        }
    }
}

/// What a session did with an application message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    Applied,
    Ignored,
}

/// One simulation variant behind a uniform lifecycle.
pub enum GameSession {
    Balls(BallsGame),
    Duel(DuelGame),
}

impl GameSession {
    /// Builds the session for `kind` in room `room`.
    pub fn create(kind: GameKind, room: &str, cfg: &ServerConfig) -> Result<Self, SessionError> {
        Ok(match kind {
            GameKind::Balls => GameSession::Balls(BallsGame::from_config(room, cfg)?),
            GameKind::Duel => GameSession::Duel(DuelGame::new(room)),
        })
    }

    pub fn kind(&self) -> GameKind {
        match self {
            GameSession::Balls(_) => GameKind::Balls,
            GameSession::Duel(_) => GameKind::Duel,
        }
    }

    /// Arms the session. Idempotent.
    pub fn start(&mut self) {
        match self {
            GameSession::Balls(g) => g.start(),
            GameSession::Duel(g) => g.start(),
        }
    }

    /// Disarms the session. Idempotent.
    pub fn stop(&mut self) {
        match self {
            GameSession::Balls(g) => g.stop(),
            GameSession::Duel(g) => g.stop(),
        }
    }

    pub fn is_running(&self) -> bool {
        match self {
            GameSession::Balls(g) => g.is_running(),
            GameSession::Duel(g) => g.is_running(),
        }
    }

    /// Advances one logical tick.
    pub fn update(&mut self) {
        match self {
            GameSession::Balls(g) => g.update(),
            GameSession::Duel(g) => g.update(),
        }
    }

    /// Current broadcastable snapshot.
    pub fn export_state(&self) -> Bytes {
        match self {
            GameSession::Balls(g) => g.export_state(),
            GameSession::Duel(g) => g.export_state(),
        }
    }

    /// Parses and applies one raw application message.
    pub fn handle_client_message(
        &mut self,
        conn: ConnectionId,
        raw: &[u8],
    ) -> Result<MessageOutcome, SessionError> {
        let msg = ClientMessage::parse(raw)?;
        self.apply_message(conn, &msg)
    }

    /// Applies an already-parsed application message.
    pub fn apply_message(
        &mut self,
        conn: ConnectionId,
        msg: &ClientMessage,
    ) -> Result<MessageOutcome, SessionError> {
        match self {
            GameSession::Balls(g) => g.apply_message(conn, msg),
            GameSession::Duel(g) => g.apply_message(conn, msg),
        }
    }

    pub fn add_client(&mut self, conn: ConnectionId) -> Result<(), SessionError> {
        match self {
            GameSession::Balls(g) => g.add_client(conn),
            GameSession::Duel(g) => g.add_client(conn),
        }
    }

    pub fn remove_client(&mut self, conn: ConnectionId) {
        match self {
            GameSession::Balls(g) => g.remove_client(conn),
            GameSession::Duel(g) => g.remove_client(conn),
        }
    }
}
