//! Standalone server binary.
//!
//! Usage:
//!   cargo run -p arena_server -- [--config server.json] [--addr 127.0.0.1:8080] [--tick-hz 60]
//!
//! Clients connect with a WebSocket to `ws://<addr>/?room=<key>&game=<tag>`.
//!
//! Console commands:
//!   status         - List rooms
//!   stop <room>    - Stop a room
//!   quit           - Shutdown server

use std::env;
use std::io::{BufRead, Write};

use anyhow::Context;
use arena_server::{console::exec_console, ArenaServer};
use arena_shared::config::ServerConfig;
use tokio::sync::mpsc;
use tracing::info;

fn parse_args() -> anyhow::Result<ServerConfig> {
    let args: Vec<String> = env::args().collect();

    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => {
            let path = &args[i + 1];
            let text = std::fs::read_to_string(path).with_context(|| format!("read {path}"))?;
            ServerConfig::from_json_str(&text).with_context(|| format!("parse {path}"))?
        }
        _ => ServerConfig::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.listen_addr = args[i + 1].clone();
                i += 2;
            }
            "--tick-hz" if i + 1 < args.len() => {
                cfg.tick_hz = args[i + 1].parse().unwrap_or(cfg.tick_hz);
                i += 2;
            }
            "--broadcast-hz" if i + 1 < args.len() => {
                cfg.broadcast_hz = args[i + 1].parse().unwrap_or(cfg.broadcast_hz);
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(addr = %cfg.listen_addr, tick_hz = cfg.tick_hz, arena = ?(cfg.arena_width, cfg.arena_height), "Starting server");

    let server = ArenaServer::bind(cfg).await.context("create server")?;
    let local = server.local_addr()?;
    info!(%local, "Server listening");
    let registry = server.registry();

    // Set up console input channel.
    let (console_tx, mut console_rx) = mpsc::channel::<String>(32);

    // Spawn stdin reader thread.
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            print!("] ");
            let _ = stdout.flush();
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    println!("Server ready on ws://{local}/. Type 'status' for rooms, 'quit' to exit.");
    println!();

    let console = async move {
        while let Some(line) = console_rx.recv().await {
            if matches!(line.as_str(), "quit" | "exit") {
                return;
            }
            for out in exec_console(&registry, &line).await {
                println!("{out}");
            }
        }
        // Stdin closed (e.g. running detached): keep serving.
        std::future::pending::<()>().await
    };

    tokio::select! {
        res = server.run() => res?,
        _ = console => {}
    }
    info!("Server shutting down");
    Ok(())
}
