//! Free-running bouncing-circle variant.

use std::collections::HashSet;

use arena_shared::{
    config::ServerConfig,
    net::{ClientMessage, ConnectionId},
    physics::{Arena, EngineError},
    wire,
};
use bytes::Bytes;
use tracing::{debug, info, warn};

use super::{MessageOutcome, SessionError};

/// Radius of circles dropped by the periodic auto-spawn.
const AUTO_SPAWN_RADIUS: f32 = 15.0;

/// Physics session. Accepts any number of spectators.
pub struct BallsGame {
    room: String,
    arena: Arena,
    running: bool,
    tick: u64,
    auto_spawn_every: u32,
    viewers: HashSet<ConnectionId>,
}

impl BallsGame {
    pub fn new(room: &str, arena: Arena, auto_spawn_every: u32) -> Self {
        Self {
            room: room.to_string(),
            arena,
            running: false,
            tick: 0,
            auto_spawn_every,
            viewers: HashSet::new(),
        }
    }

    pub fn from_config(room: &str, cfg: &ServerConfig) -> Result<Self, EngineError> {
        let mut arena = Arena::new(cfg.arena_width, cfg.arena_height);
        if cfg.initial_circles > 0 {
            arena.initialize(cfg.initial_circles)?;
        }
        Ok(Self::new(room, arena, cfg.auto_spawn_every_ticks))
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn arena_mut(&mut self) -> &mut Arena {
        &mut self.arena
    }

    pub fn start(&mut self) {
        if self.running {
            return;
        }
        self.running = true;
        info!(room = %self.room, circles = self.arena.len(), "Balls simulation started");
    }

    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        info!(room = %self.room, tick = self.tick, "Balls simulation stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn update(&mut self) {
        self.tick += 1;
        if self.auto_spawn_every > 0 && self.tick % u64::from(self.auto_spawn_every) == 0 {
            match self.arena.spawn_resting(AUTO_SPAWN_RADIUS) {
                Ok(id) => debug!(room = %self.room, id, "Auto-spawned circle"),
                Err(e) => warn!(room = %self.room, error = %e, "Auto-spawn skipped"),
            }
        }
        self.arena.step();
    }

    pub fn export_state(&self) -> Bytes {
        wire::encode(self.arena.circles())
    }

    pub fn apply_message(
        &mut self,
        conn: ConnectionId,
        msg: &ClientMessage,
    ) -> Result<MessageOutcome, SessionError> {
        match msg {
            ClientMessage::AddCircle(p) => {
                let (x, y) = p.position();
                let id = self.arena.spawn_at(x, y);
                debug!(room = %self.room, %conn, id, x, y, "Added circle");
                Ok(MessageOutcome::Applied)
            }
            ClientMessage::SetUsername(_) => Ok(MessageOutcome::Ignored),
        }
    }

    pub fn add_client(&mut self, conn: ConnectionId) -> Result<(), SessionError> {
        self.viewers.insert(conn);
        debug!(room = %self.room, %conn, viewers = self.viewers.len(), "Viewer joined");
        Ok(())
    }

    pub fn remove_client(&mut self, conn: ConnectionId) {
        if self.viewers.remove(&conn) {
            debug!(room = %self.room, %conn, viewers = self.viewers.len(), "Viewer left");
        }
    }
}
