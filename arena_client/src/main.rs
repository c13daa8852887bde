//! Standalone viewer binary.
//!
//! Usage:
//!   cargo run -p arena_client -- [--addr 127.0.0.1:8080] [--room default] [--game balls] [--name ada]
//!
//! The viewer joins a room, keeps the latest snapshots, and logs the circle
//! count now and then.
//!
//! Console commands:
//!   add <x> <y>   - Drop a circle
//!   name <name>   - Set username
//!   status        - Show client status
//!   quit          - Exit client

use std::env;
use std::io::{BufRead, Write};

use anyhow::Context;
use arena_client::client::{GameClient, Incoming};
use arena_shared::{config::ClientConfig, net::ServerEvent};
use tokio::sync::mpsc;
use tracing::info;

fn parse_args() -> ClientConfig {
    let mut cfg = ClientConfig::default();
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.server_addr = args[i + 1].clone();
                i += 2;
            }
            "--room" if i + 1 < args.len() => {
                cfg.room = args[i + 1].clone();
                i += 2;
            }
            "--game" if i + 1 < args.len() => {
                cfg.game = args[i + 1].clone();
                i += 2;
            }
            "--name" if i + 1 < args.len() => {
                cfg.player_name = Some(args[i + 1].clone());
                i += 2;
            }
            _ => i += 1,
        }
    }
    cfg
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args();
    info!(server = %cfg.server_addr, room = %cfg.room, game = %cfg.game, "Starting client");

    let mut client = GameClient::connect(&cfg).await.context("connect")?;

    let (console_tx, mut console_rx) = mpsc::channel::<String>(32);

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

    println!("Client connected. Type 'status' for info, 'quit' to exit.");
    println!();

    let mut console_open = true;
    loop {
        tokio::select! {
            line = console_rx.recv(), if console_open => {
                let Some(line) = line else {
                    console_open = false;
                    continue;
                };
                if matches!(line.as_str(), "quit" | "exit") {
                    break;
                }
                match client.exec_console(&line).await {
                    Ok(output) => {
                        for line in output {
                            println!("{}", line);
                        }
                    }
                    Err(e) => println!("Error: {}", e),
                }
            }
            incoming = client.recv() => match incoming? {
                Incoming::Snapshot(count) => {
                    if client.frames.received() % 60 == 0 {
                        info!(frames = client.frames.received(), circles = count, "Snapshot");
                    }
                }
                Incoming::Event(ServerEvent::UsernameAccepted(p)) => {
                    println!("Name accepted: {}", p.name);
                }
                Incoming::Event(ServerEvent::Error(p)) => {
                    println!("Server error: {}", p.message);
                }
                Incoming::Closed => {
                    println!("Disconnected from server.");
                    break;
                }
            },
        }
    }

    client.close().await?;
    Ok(())
}
