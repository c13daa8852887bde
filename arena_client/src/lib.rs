//! `arena_client`
//!
//! Headless viewer for arena rooms:
//! - WebSocket connection to one room
//! - Pointer input turned into `add_circle` messages
//! - Frame history and interpolation for circle positions

pub mod client;
pub mod input;
pub mod interp;

pub use client::GameClient;
