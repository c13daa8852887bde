//! Shared harness for the arena integration tests.
//!
//! Starts a real server on an ephemeral localhost port and hands out client
//! configs pointing at it.

use std::{future::Future, sync::Arc, time::Duration};

use arena_server::{server::bind_ephemeral, Registry};
use arena_shared::config::{ClientConfig, ServerConfig};
use tokio::task::JoinHandle;
use tracing::info;

/// Installs a test-writer subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// Fast ticks and no auto-spawn so circle counts stay predictable.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        tick_hz: 200,
        broadcast_hz: 200,
        auto_spawn_every_ticks: 0,
        outbound_queue: 64,
        ..ServerConfig::default()
    }
}

/// A server running in the background of the current runtime.
pub struct TestServer {
    pub addr: String,
    pub registry: Arc<Registry>,
    task: JoinHandle<anyhow::Result<()>>,
}

impl TestServer {
    pub async fn start(cfg: ServerConfig) -> anyhow::Result<Self> {
        let (server, cfg) = bind_ephemeral(cfg).await?;
        let registry = server.registry();
        let task = tokio::spawn(server.run());
        info!(addr = %cfg.listen_addr, "Test server started");
        Ok(Self {
            addr: cfg.listen_addr,
            registry,
            task,
        })
    }

    /// Client config joining `room` with `game`.
    pub fn client(&self, room: &str, game: &str) -> ClientConfig {
        ClientConfig {
            server_addr: self.addr.clone(),
            room: room.to_string(),
            game: game.to_string(),
            ..ClientConfig::default()
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Polls `cond` every few milliseconds until it holds or `timeout` elapses.
pub async fn eventually<F, Fut>(timeout: Duration, mut cond: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if cond().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
