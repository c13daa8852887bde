//! Room orchestration.
//!
//! A room owns exactly one [`GameSession`] and the set of attached
//! connections. Everything that touches either runs on the room's own task:
//! other tasks only reach a room through its [`RoomHandle`], which forwards
//! commands over one FIFO queue. That single-writer discipline is what lets
//! the physics step and the snapshot encode run without locks.
//!
//! The loop waits on whichever comes first of:
//! - the simulation interval (advances the session while it is running),
//! - the broadcast interval (exports once, fans out to every connection),
//! - the next command (attach, detach, message, stop).
//!
//! Snapshots are pushed into each connection's bounded outbound queue with
//! `try_send`; a peer that falls behind loses frames instead of stalling the
//! room.

use std::{collections::HashMap, sync::Arc, time::Duration};

use arena_shared::{
    config::ServerConfig,
    net::{ClientMessage, ConnectionId, ServerEvent},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use thiserror::Error;
use tokio::{
    sync::{
        mpsc::{self, error::TrySendError},
        oneshot, watch,
    },
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info, trace, warn};

use crate::session::{GameKind, GameSession, SessionError};

/// Process-unique room id. Distinguishes successive rooms under one key.
pub type RoomId = u64;

pub(crate) type RoomMap = Arc<DashMap<String, RoomHandle>>;

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("room {0:?} is closed")]
    Closed(String),
    #[error(transparent)]
    Session(#[from] SessionError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPhase {
    Created,
    Running,
    Stopped,
}

/// Published by the room loop after every lifecycle change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomStatus {
    pub phase: RoomPhase,
    pub clients: usize,
}

/// Frames queued for one connection's writer.
#[derive(Debug, Clone)]
pub enum Outbound {
    Snapshot(Bytes),
    Event(ServerEvent),
}

pub(crate) enum RoomCommand {
    Attach {
        conn: ConnectionId,
        outbound: mpsc::Sender<Outbound>,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Detach {
        conn: ConnectionId,
    },
    Message {
        conn: ConnectionId,
        msg: ClientMessage,
    },
    Stop,
}

#[derive(Debug)]
struct RoomMeta {
    id: RoomId,
    key: String,
    kind: GameKind,
    created_at: DateTime<Utc>,
}

/// Cloneable address of a running room.
#[derive(Clone, Debug)]
pub struct RoomHandle {
    meta: Arc<RoomMeta>,
    commands: mpsc::Sender<RoomCommand>,
    status: watch::Receiver<RoomStatus>,
}

impl RoomHandle {
    pub fn id(&self) -> RoomId {
        self.meta.id
    }

    pub fn key(&self) -> &str {
        &self.meta.key
    }

    pub fn kind(&self) -> GameKind {
        self.meta.kind
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.meta.created_at
    }

    pub fn status(&self) -> RoomStatus {
        *self.status.borrow()
    }

    /// Registers `conn` with the room. `outbound` receives its snapshots and
    /// events until it detaches or the room stops.
    pub async fn attach(
        &self,
        conn: ConnectionId,
        outbound: mpsc::Sender<Outbound>,
    ) -> Result<(), RoomError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(RoomCommand::Attach {
                conn,
                outbound,
                reply,
            })
            .await
            .map_err(|_| self.closed())?;
        rx.await.map_err(|_| self.closed())??;
        Ok(())
    }

    /// Unregisters `conn`. A no-op once the room has stopped.
    pub async fn detach(&self, conn: ConnectionId) {
        if self.commands.send(RoomCommand::Detach { conn }).await.is_err() {
            trace!(room = %self.meta.key, %conn, "Detach after room closed");
        }
    }

    /// Queues an already-parsed application message from `conn`.
    pub async fn send_message(
        &self,
        conn: ConnectionId,
        msg: ClientMessage,
    ) -> Result<(), RoomError> {
        self.commands
            .send(RoomCommand::Message { conn, msg })
            .await
            .map_err(|_| self.closed())
    }

    /// Asks the room to stop. A no-op once the room has stopped.
    pub async fn stop(&self) {
        let _ = self.commands.send(RoomCommand::Stop).await;
    }

    /// Resolves once the room has stopped and left the registry.
    pub async fn stopped(&self) {
        let mut status = self.status.clone();
        // Err means the loop is gone, which also means stopped.
        let _ = status.wait_for(|s| s.phase == RoomPhase::Stopped).await;
    }

    fn closed(&self) -> RoomError {
        RoomError::Closed(self.meta.key.clone())
    }
}

struct Client {
    outbound: mpsc::Sender<Outbound>,
    name: Option<String>,
    dropped_frames: u64,
}

enum Flow {
    Continue,
    Break,
}

pub(crate) struct Room {
    meta: Arc<RoomMeta>,
    session: GameSession,
    clients: HashMap<ConnectionId, Client>,
    commands: mpsc::Receiver<RoomCommand>,
    status: watch::Sender<RoomStatus>,
    rooms: RoomMap,
    sim_period: Duration,
    broadcast_period: Duration,
}

/// Shortest timer period a room accepts; `interval` panics on zero.
const MIN_PERIOD: Duration = Duration::from_millis(1);

fn period(hz: u32) -> Duration {
    Duration::from_secs_f64(1.0 / f64::from(hz.max(1))).max(MIN_PERIOD)
}

impl Room {
    /// Spawns the room task and returns its handle. The caller is expected to
    /// publish the handle in `rooms` under `key`.
    pub(crate) fn spawn(
        id: RoomId,
        key: &str,
        session: GameSession,
        cfg: &ServerConfig,
        rooms: RoomMap,
    ) -> RoomHandle {
        let meta = Arc::new(RoomMeta {
            id,
            key: key.to_string(),
            kind: session.kind(),
            created_at: Utc::now(),
        });
        let (tx, rx) = mpsc::channel(cfg.command_queue.max(1));
        let (status_tx, status_rx) = watch::channel(RoomStatus {
            phase: RoomPhase::Created,
            clients: 0,
        });

        let room = Room {
            meta: Arc::clone(&meta),
            session,
            clients: HashMap::new(),
            commands: rx,
            status: status_tx,
            rooms,
            sim_period: period(cfg.tick_hz),
            broadcast_period: period(cfg.broadcast_hz),
        };
        tokio::spawn(room.run());

        RoomHandle {
            meta,
            commands: tx,
            status: status_rx,
        }
    }

    async fn run(mut self) {
        self.session.start();
        self.publish(RoomPhase::Running);
        info!(room = %self.meta.key, id = self.meta.id, game = %self.meta.kind, "Room running");

        let mut sim = time::interval(self.sim_period);
        sim.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut broadcast = time::interval(self.broadcast_period);
        broadcast.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            // Timers first so a command burst cannot delay a tick. Commands
            // only run between ticks, so update plus broadcast must fit in
            // one period or commands wait.
            let flow = tokio::select! {
                biased;
                _ = sim.tick() => {
                    if self.session.is_running() {
                        self.session.update();
                    }
                    Flow::Continue
                }
                _ = broadcast.tick() => {
                    self.broadcast();
                    Flow::Continue
                }
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.handle(cmd),
                    None => Flow::Break,
                },
            };
            if let Flow::Break = flow {
                break;
            }
        }

        self.shutdown();
    }

    fn handle(&mut self, cmd: RoomCommand) -> Flow {
        match cmd {
            RoomCommand::Attach {
                conn,
                outbound,
                reply,
            } => {
                let result = self.attach(conn, outbound);
                let _ = reply.send(result);
                Flow::Continue
            }
            RoomCommand::Detach { conn } => self.detach(conn),
            RoomCommand::Message { conn, msg } => {
                self.on_message(conn, msg);
                Flow::Continue
            }
            RoomCommand::Stop => {
                info!(room = %self.meta.key, "Stop requested");
                Flow::Break
            }
        }
    }

    fn attach(
        &mut self,
        conn: ConnectionId,
        outbound: mpsc::Sender<Outbound>,
    ) -> Result<(), SessionError> {
        if let Some(client) = self.clients.get_mut(&conn) {
            client.outbound = outbound;
            return Ok(());
        }
        if let Err(e) = self.session.add_client(conn) {
            warn!(room = %self.meta.key, %conn, error = %e, "Attach rejected");
            return Err(e);
        }
        self.clients.insert(
            conn,
            Client {
                outbound,
                name: None,
                dropped_frames: 0,
            },
        );
        info!(room = %self.meta.key, %conn, clients = self.clients.len(), "Client joined");
        self.publish(RoomPhase::Running);
        Ok(())
    }

    fn detach(&mut self, conn: ConnectionId) -> Flow {
        let Some(client) = self.clients.remove(&conn) else {
            debug!(room = %self.meta.key, %conn, "Detach for unknown connection");
            return Flow::Continue;
        };
        self.session.remove_client(conn);
        info!(
            room = %self.meta.key,
            %conn,
            name = client.name.as_deref().unwrap_or("-"),
            dropped_frames = client.dropped_frames,
            clients = self.clients.len(),
            "Client left"
        );
        self.publish(RoomPhase::Running);

        if self.clients.is_empty() {
            Flow::Break
        } else {
            Flow::Continue
        }
    }

    fn on_message(&mut self, conn: ConnectionId, msg: ClientMessage) {
        let Some(client) = self.clients.get_mut(&conn) else {
            debug!(room = %self.meta.key, %conn, "Message from unattached connection");
            return;
        };

        match msg {
            ClientMessage::SetUsername(payload) => {
                info!(room = %self.meta.key, %conn, name = %payload.name, "Username set");
                client.name = Some(payload.name.clone());
                let ack = Outbound::Event(ServerEvent::UsernameAccepted(payload));
                if let Err(e) = client.outbound.try_send(ack) {
                    warn!(room = %self.meta.key, %conn, error = %e, "Username ack not queued");
                }
            }
            other => match self.session.apply_message(conn, &other) {
                Ok(outcome) => trace!(room = %self.meta.key, %conn, ?outcome, "Message handled"),
                Err(e) => debug!(room = %self.meta.key, %conn, error = %e, "Message rejected"),
            },
        }
    }

    fn broadcast(&mut self) {
        if self.clients.is_empty() {
            return;
        }
        let frame = self.session.export_state();
        for (conn, client) in &mut self.clients {
            match client.outbound.try_send(Outbound::Snapshot(frame.clone())) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    client.dropped_frames += 1;
                    trace!(room = %self.meta.key, %conn, "Outbound full, frame dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    trace!(room = %self.meta.key, %conn, "Outbound closed, awaiting detach");
                }
            }
        }
    }

    fn shutdown(&mut self) {
        self.session.stop();

        let id = self.meta.id;
        self.rooms.remove_if(&self.meta.key, |_, h| h.id() == id);

        // Late attaches see their reply dropped and report the room closed.
        self.commands.close();
        while self.commands.try_recv().is_ok() {}

        // Dropping the outbound senders ends every connection's writer.
        self.clients.clear();
        self.publish(RoomPhase::Stopped);
        info!(room = %self.meta.key, id, "Room stopped");
    }

    fn publish(&self, phase: RoomPhase) {
        self.status.send_replace(RoomStatus {
            phase,
            clients: self.clients.len(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_period_is_never_zero() {
        assert_eq!(period(0), Duration::from_secs(1));
        assert_eq!(period(1_000), Duration::from_millis(1));
        assert_eq!(period(u32::MAX), MIN_PERIOD);
        assert!(period(60) > Duration::from_millis(16));
    }
}
