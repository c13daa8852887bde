//! Two-player slot variant.
//!
//! Each seated player holds a counter that starts at `20 + slot` and drains by
//! one every [`DUEL_DRAIN_EVERY`] ticks until it reaches zero.

use arena_shared::net::{ClientMessage, ConnectionId};
use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, info};

use super::{MessageOutcome, SessionError};

pub const DUEL_CAPACITY: usize = 2;
pub const DUEL_DRAIN_EVERY: u32 = 120;
pub const DUEL_START_COUNTER: u16 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Seat {
    conn: ConnectionId,
    counter: u16,
}

pub struct DuelGame {
    room: String,
    seats: [Option<Seat>; DUEL_CAPACITY],
    phase: u32,
    running: bool,
}

impl DuelGame {
    pub fn new(room: &str) -> Self {
        Self {
            room: room.to_string(),
            seats: [None; DUEL_CAPACITY],
            phase: 0,
            running: false,
        }
    }

    /// Occupied seats as `(slot, connection, counter)`.
    pub fn players(&self) -> impl Iterator<Item = (u8, ConnectionId, u16)> + '_ {
        self.seats
            .iter()
            .enumerate()
            .filter_map(|(slot, s)| s.map(|s| (slot as u8, s.conn, s.counter)))
    }

    pub fn start(&mut self) {
        if self.running {
            return;
        }
        self.running = true;
        info!(room = %self.room, "Duel started");
    }

    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        info!(room = %self.room, "Duel stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn update(&mut self) {
        let seated = self.seats.iter().any(Option::is_some);
        if seated && self.phase == DUEL_DRAIN_EVERY - 1 {
            for seat in self.seats.iter_mut().flatten() {
                seat.counter = seat.counter.saturating_sub(1);
            }
        }
        self.phase = (self.phase + 1) % DUEL_DRAIN_EVERY;
    }

    /// Three bytes per occupied seat: slot, then counter big-endian.
    pub fn export_state(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(DUEL_CAPACITY * 3);
        for (slot, _, counter) in self.players() {
            buf.put_u8(slot);
            buf.put_u16(counter);
        }
        buf.freeze()
    }

    pub fn apply_message(
        &mut self,
        conn: ConnectionId,
        msg: &ClientMessage,
    ) -> Result<MessageOutcome, SessionError> {
        debug!(room = %self.room, %conn, kind = msg.kind(), "Duel ignores message");
        Ok(MessageOutcome::Ignored)
    }

    pub fn add_client(&mut self, conn: ConnectionId) -> Result<(), SessionError> {
        if self.seats.iter().flatten().any(|s| s.conn == conn) {
            return Ok(());
        }
        let Some(slot) = self.seats.iter().position(Option::is_none) else {
            return Err(SessionError::RoomFull {
                capacity: DUEL_CAPACITY,
            });
        };
        self.seats[slot] = Some(Seat {
            conn,
            counter: DUEL_START_COUNTER + slot as u16,
        });
        info!(room = %self.room, %conn, slot, "Player seated");
        Ok(())
    }

    pub fn remove_client(&mut self, conn: ConnectionId) {
        for (slot, seat) in self.seats.iter_mut().enumerate() {
            if seat.is_some_and(|s| s.conn == conn) {
                *seat = None;
                info!(room = %self.room, %conn, slot, "Player left seat");
            }
        }
    }
}
