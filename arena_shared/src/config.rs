//! Configuration system.
//!
//! Loads server configuration from JSON strings/files (file IO left to app).

use serde::{Deserialize, Serialize};

/// Root configuration for the room server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address, e.g. `127.0.0.1:8080`.
    pub listen_addr: String,
    /// Simulation tick rate of every room.
    pub tick_hz: u32,
    /// Snapshot broadcast rate of every room.
    pub broadcast_hz: u32,
    pub arena_width: u16,
    pub arena_height: u16,
    /// Circles placed when a physics room is created.
    pub initial_circles: usize,
    /// Physics rooms drop a resting circle every N ticks. `0` disables.
    pub auto_spawn_every_ticks: u32,
    /// Capacity of each room's command queue.
    pub command_queue: usize,
    /// Capacity of each connection's outbound queue, in frames.
    pub outbound_queue: usize,
    /// Room key used when a connection does not name one.
    pub default_room: String,
    /// Game variant used when a connection does not name one.
    pub default_game: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            tick_hz: 60,
            broadcast_hz: 60,
            arena_width: 800,
            arena_height: 600,
            initial_circles: 0,
            auto_spawn_every_ticks: 600,
            command_queue: 256,
            outbound_queue: 8,
            default_room: "default".to_string(),
            default_game: "balls".to_string(),
        }
    }
}

impl ServerConfig {
    /// Parses config from JSON. Missing fields take their defaults.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}

/// Viewer client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server address, e.g. `127.0.0.1:8080`.
    pub server_addr: String,
    pub room: String,
    pub game: String,
    /// Sent as `set_username` right after connecting.
    pub player_name: Option<String>,
    /// Decoded frames kept for interpolation.
    pub frame_history: usize,
    /// Arena size clicks are clamped to. Must match the server's arena.
    pub arena_width: u16,
    pub arena_height: u16,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:8080".to_string(),
            room: "default".to_string(),
            game: "balls".to_string(),
            player_name: None,
            frame_history: 32,
            arena_width: 800,
            arena_height: 600,
        }
    }
}

impl ClientConfig {
    /// WebSocket URL joining the configured room. Room and game are
    /// form-encoded so any key survives the query string.
    pub fn url(&self) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("room", &self.room)
            .append_pair("game", &self.game)
            .finish();
        format!("ws://{}/?{}", self.server_addr, query)
    }
}
