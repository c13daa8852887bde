//! `arena_server`
//!
//! Server-side systems:
//! - Game sessions (closed set of simulation variants)
//! - Rooms: one control loop per room, sole owner of its session
//! - Registry: room key -> room, created on first join
//! - WebSocket transport feeding rooms and draining their snapshots
//!
//! Networking model:
//! - Text frames: JSON `{type, payload}` envelopes both ways
//! - Binary frames: room -> client snapshots at the broadcast rate

pub mod console;
pub mod registry;
pub mod room;
pub mod server;
pub mod session;
pub mod transport;

pub use registry::Registry;
pub use server::ArenaServer;
