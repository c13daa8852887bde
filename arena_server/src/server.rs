//! Server front.
//!
//! Binds the listener, owns the room registry, and hands every accepted
//! socket to the transport. All simulation happens inside rooms; this type
//! only wires them to the network.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
};

use anyhow::Context;
use arena_shared::config::ServerConfig;
use tokio::net::TcpListener;
use tracing::info;

use crate::{registry::Registry, transport};

/// Room server.
pub struct ArenaServer {
    pub cfg: ServerConfig,
    registry: Arc<Registry>,
    listener: TcpListener,
}

impl ArenaServer {
    /// Binds the listen socket from `cfg`.
    pub async fn bind(cfg: ServerConfig) -> anyhow::Result<Self> {
        let addr: SocketAddr = cfg.listen_addr.parse().context("parse listen_addr")?;
        let listener = TcpListener::bind(addr).await.context("tcp bind")?;
        let registry = Arc::new(Registry::new(cfg.clone()));
        Ok(Self {
            cfg,
            registry,
            listener,
        })
    }

    /// Returns the local address (after binding).
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Serves connections until the listener fails.
    pub async fn run(self) -> anyhow::Result<()> {
        info!(
            addr = %self.local_addr()?,
            tick_hz = self.cfg.tick_hz,
            broadcast_hz = self.cfg.broadcast_hz,
            "Accepting connections"
        );
        transport::serve(self.listener, self.registry).await
    }
}

/// Helper for tests: bind to an ephemeral localhost port.
pub async fn bind_ephemeral(mut cfg: ServerConfig) -> anyhow::Result<(ArenaServer, ServerConfig)> {
    cfg.listen_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).to_string();
    let server = ArenaServer::bind(cfg).await?;
    let mut cfg = server.cfg.clone();
    cfg.listen_addr = server.local_addr()?.to_string();
    Ok((server, cfg))
}
