//! Room registry.
//!
//! Maps room keys to running rooms. Lookups that miss create the room in the
//! same map entry, so concurrent first lookups for one key always agree on a
//! single room. Rooms remove their own entry when they stop.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use arena_shared::{config::ServerConfig, net::ConnectionId};
use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::{
    room::{Outbound, Room, RoomError, RoomHandle, RoomMap, RoomPhase},
    session::{GameKind, GameSession, SessionError},
};

/// How often `join` retries when it races a room that is shutting down.
const JOIN_ATTEMPTS: usize = 3;

/// Point-in-time view of one room, for status output.
#[derive(Debug, Clone)]
pub struct RoomSummary {
    pub key: String,
    pub game: GameKind,
    pub phase: RoomPhase,
    pub clients: usize,
    pub created_at: DateTime<Utc>,
}

pub struct Registry {
    cfg: Arc<ServerConfig>,
    rooms: RoomMap,
    next_room_id: AtomicU64,
}

impl Registry {
    pub fn new(cfg: ServerConfig) -> Self {
        Self {
            cfg: Arc::new(cfg),
            rooms: Arc::new(DashMap::new()),
            next_room_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.cfg
    }

    pub fn get(&self, key: &str) -> Option<RoomHandle> {
        self.rooms.get(key).map(|r| r.clone())
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Returns the room under `key`, creating it for `game` if absent.
    ///
    /// An existing room is returned as is, whatever game it runs. An unknown
    /// `game` only fails when a room would have to be created.
    pub fn get_or_create(&self, key: &str, game: &str) -> Result<RoomHandle, SessionError> {
        match self.rooms.entry(key.to_string()) {
            Entry::Occupied(e) => {
                let room = e.get().clone();
                if room.kind().as_str() != game {
                    debug!(room = %key, running = %room.kind(), requested = %game, "Joining room of another game");
                }
                Ok(room)
            }
            Entry::Vacant(v) => {
                let kind: GameKind = game.parse()?;
                let session = GameSession::create(kind, key, &self.cfg)?;
                let id = self.next_room_id.fetch_add(1, Ordering::Relaxed);
                let room = Room::spawn(id, key, session, &self.cfg, Arc::clone(&self.rooms));
                v.insert(room.clone());
                info!(room = %key, id, game = %kind, "Room created");
                Ok(room)
            }
        }
    }

    /// Finds or creates the room and attaches `conn` to it.
    pub async fn join(
        &self,
        key: &str,
        game: &str,
        conn: ConnectionId,
        outbound: mpsc::Sender<Outbound>,
    ) -> Result<RoomHandle, RoomError> {
        for attempt in 1..=JOIN_ATTEMPTS {
            let room = self.get_or_create(key, game)?;
            match room.attach(conn, outbound.clone()).await {
                Ok(()) => return Ok(room),
                Err(RoomError::Closed(_)) => {
                    debug!(room = %key, %conn, attempt, "Room closed during join, retrying");
                    tokio::task::yield_now().await;
                }
                Err(e) => return Err(e),
            }
        }
        Err(RoomError::Closed(key.to_string()))
    }

    /// Stops the room under `key`. Returns false if there is none.
    pub async fn stop(&self, key: &str) -> bool {
        match self.get(key) {
            Some(room) => {
                room.stop().await;
                room.stopped().await;
                true
            }
            None => false,
        }
    }

    /// Summaries of all rooms, ordered by key.
    pub fn rooms(&self) -> Vec<RoomSummary> {
        let mut out: Vec<RoomSummary> = self
            .rooms
            .iter()
            .map(|r| {
                let status = r.status();
                RoomSummary {
                    key: r.key().to_string(),
                    game: r.kind(),
                    phase: status.phase,
                    clients: status.clients,
                    created_at: r.created_at(),
                }
            })
            .collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        out
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use arena_shared::{
        net::{AddCirclePayload, ClientMessage, ServerEvent, UsernamePayload},
        wire,
    };
    use bytes::Bytes;
    use tokio::time::timeout;

    use super::*;

    fn test_config() -> ServerConfig {
        ServerConfig {
            tick_hz: 200,
            broadcast_hz: 200,
            auto_spawn_every_ticks: 0,
            outbound_queue: 64,
            ..Default::default()
        }
    }

    fn outbound(cfg: &ServerConfig) -> (mpsc::Sender<Outbound>, mpsc::Receiver<Outbound>) {
        mpsc::channel(cfg.outbound_queue)
    }

    async fn next_snapshot(rx: &mut mpsc::Receiver<Outbound>) -> Bytes {
        loop {
            match timeout(Duration::from_secs(2), rx.recv()).await {
                Ok(Some(Outbound::Snapshot(b))) => return b,
                Ok(Some(Outbound::Event(_))) => continue,
                Ok(None) => panic!("outbound closed"),
                Err(_) => panic!("no snapshot within 2s"),
            }
        }
    }

    #[tokio::test]
    async fn last_detach_stops_room_and_unregisters_it() {
        let registry = Registry::new(test_config());
        let (tx, _rx) = outbound(registry.config());
        let c1 = ConnectionId::new_unique();

        let room = registry.join("b", "balls", c1, tx).await.unwrap();
        assert_eq!(room.status().clients, 1);
        assert_eq!(room.status().phase, RoomPhase::Running);
        assert!(registry.get("b").is_some());

        room.detach(c1).await;
        timeout(Duration::from_secs(2), room.stopped()).await.unwrap();
        assert_eq!(room.status().phase, RoomPhase::Stopped);
        assert!(registry.get("b").is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn unknown_game_creates_nothing() {
        let registry = Registry::new(test_config());
        let (tx, _rx) = outbound(registry.config());
        let err = registry
            .join("x", "chess", ConnectionId::new_unique(), tx.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, RoomError::Session(SessionError::UnknownGame(_))));
        let err = registry
            .join("x", "colors", ConnectionId::new_unique(), tx)
            .await
            .unwrap_err();
        assert!(matches!(err, RoomError::Session(SessionError::NotImplemented(_))));
        assert!(registry.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_lookups_create_one_room() {
        let registry = Arc::new(Registry::new(test_config()));
        let mut tasks = Vec::new();
        for _ in 0..32 {
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move {
                registry.get_or_create("same", "balls").unwrap().id()
            }));
        }
        let mut ids = Vec::new();
        for t in tasks {
            ids.push(t.await.unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(registry.len(), 1);
        assert!(registry.stop("same").await);
        assert!(registry.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn attach_detach_burst_keeps_client_count_exact() {
        let registry = Arc::new(Registry::new(test_config()));
        let (anchor_tx, _anchor_rx) = outbound(registry.config());
        let room = registry
            .join("burst", "balls", ConnectionId::new_unique(), anchor_tx)
            .await
            .unwrap();

        let mut tasks = Vec::new();
        for i in 0..50 {
            let room = room.clone();
            tasks.push(tokio::spawn(async move {
                let conn = ConnectionId::new_unique();
                let (tx, rx) = mpsc::channel(4);
                room.attach(conn, tx).await.unwrap();
                if i % 2 == 0 {
                    room.detach(conn).await;
                }
                rx
            }));
        }
        let mut keep = Vec::new();
        for t in tasks {
            keep.push(t.await.unwrap());
        }

        // FIFO queue: once this attach is answered every earlier command ran.
        let (tx, _rx) = outbound(registry.config());
        room.attach(ConnectionId::new_unique(), tx).await.unwrap();
        assert_eq!(room.status().clients, 1 + 50 - 25 + 1);
        assert_eq!(registry.len(), 1);

        registry.stop("burst").await;
    }

    #[tokio::test]
    async fn duel_room_rejects_third_player() {
        let registry = Registry::new(test_config());
        let mut rxs = Vec::new();
        for _ in 0..2 {
            let (tx, rx) = outbound(registry.config());
            registry
                .join("d", "duel", ConnectionId::new_unique(), tx)
                .await
                .unwrap();
            rxs.push(rx);
        }
        let (tx, _rx) = outbound(registry.config());
        let err = registry
            .join("d", "duel", ConnectionId::new_unique(), tx)
            .await
            .unwrap_err();
        assert!(matches!(err, RoomError::Session(SessionError::RoomFull { capacity: 2 })));
        assert_eq!(registry.get("d").unwrap().status().clients, 2);

        // Duel snapshots carry one 3-byte record per seat.
        assert_eq!(next_snapshot(&mut rxs[0]).await.len(), 6);
        registry.stop("d").await;
    }

    #[tokio::test]
    async fn add_circle_shows_up_in_next_snapshot() {
        let registry = Registry::new(test_config());
        let (tx, mut rx) = outbound(registry.config());
        let conn = ConnectionId::new_unique();
        let room = registry.join("c", "balls", conn, tx).await.unwrap();

        assert_eq!(wire::record_count(next_snapshot(&mut rx).await.len()), 0);
        room.send_message(
            conn,
            ClientMessage::AddCircle(AddCirclePayload { x: 100.0, y: 100.0 }),
        )
        .await
        .unwrap();

        // Frames queued before the message was applied may still be in flight.
        let mut count = 0;
        for _ in 0..100 {
            count = wire::record_count(next_snapshot(&mut rx).await.len());
            if count > 0 {
                break;
            }
        }
        assert_eq!(count, 1);
        registry.stop("c").await;
    }

    #[tokio::test]
    async fn username_is_acknowledged() {
        let registry = Registry::new(test_config());
        let (tx, mut rx) = outbound(registry.config());
        let conn = ConnectionId::new_unique();
        let room = registry.join("u", "balls", conn, tx).await.unwrap();
        let payload = UsernamePayload { name: "ada".into() };
        room.send_message(conn, ClientMessage::SetUsername(payload.clone()))
            .await
            .unwrap();

        let ack = timeout(Duration::from_secs(2), async {
            loop {
                if let Some(Outbound::Event(ev)) = rx.recv().await {
                    return ev;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(ack, ServerEvent::UsernameAccepted(payload));
        registry.stop("u").await;
    }

    #[tokio::test]
    async fn explicit_stop_closes_outbound_and_key_can_be_reused() {
        let registry = Registry::new(test_config());
        let (tx, mut rx) = outbound(registry.config());
        let first = registry
            .join("s", "balls", ConnectionId::new_unique(), tx)
            .await
            .unwrap();

        assert!(registry.stop("s").await);
        assert!(!registry.stop("s").await);
        let drained = timeout(Duration::from_secs(2), async {
            while rx.recv().await.is_some() {}
        })
        .await;
        assert!(drained.is_ok(), "outbound should close when the room stops");

        let err = first
            .attach(ConnectionId::new_unique(), outbound(registry.config()).0)
            .await
            .unwrap_err();
        assert!(matches!(err, RoomError::Closed(_)));

        let (tx, _rx) = outbound(registry.config());
        let second = registry
            .join("s", "balls", ConnectionId::new_unique(), tx)
            .await
            .unwrap();
        assert_ne!(first.id(), second.id());
        registry.stop("s").await;
    }

    #[tokio::test]
    async fn slow_peer_does_not_stall_the_room() {
        let registry = Registry::new(test_config());
        let (slow_tx, _slow_rx) = mpsc::channel(1);
        let room = registry
            .join("slow", "balls", ConnectionId::new_unique(), slow_tx)
            .await
            .unwrap();
        let (tx, mut rx) = outbound(registry.config());
        room.attach(ConnectionId::new_unique(), tx).await.unwrap();

        for _ in 0..20 {
            next_snapshot(&mut rx).await;
        }
        assert_eq!(room.status().clients, 2);
        registry.stop("slow").await;
    }

    #[tokio::test]
    async fn summaries_list_rooms_by_key() {
        let registry = Registry::new(test_config());
        let mut rxs = Vec::new();
        for (key, game) in [("zeta", "balls"), ("alpha", "duel")] {
            let (tx, rx) = outbound(registry.config());
            registry
                .join(key, game, ConnectionId::new_unique(), tx)
                .await
                .unwrap();
            rxs.push(rx);
        }
        let rooms = registry.rooms();
        let keys: Vec<_> = rooms.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["alpha", "zeta"]);
        assert_eq!(rooms[0].game, GameKind::Duel);
        assert!(rooms.iter().all(|r| r.clients == 1 && r.phase == RoomPhase::Running));

        registry.stop("alpha").await;
        registry.stop("zeta").await;
    }
}
