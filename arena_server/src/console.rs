//! Operator console.
//!
//! Line commands read from stdin by the server binary:
//!   status        - list rooms
//!   stop <room>   - stop a room and disconnect its clients
//!   help          - list commands
//!
//! `quit` is handled by the binary itself.

use chrono::Utc;

use crate::registry::Registry;

/// Executes one console line and returns the lines to print.
pub async fn exec_console(registry: &Registry, line: &str) -> Vec<String> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some(&cmd) = tokens.first() else {
        return Vec::new();
    };

    match cmd {
        "status" => status_lines(registry),
        "stop" => match tokens.get(1) {
            None => vec!["Usage: stop <room>".to_string()],
            Some(key) => {
                if registry.stop(key).await {
                    vec![format!("Room '{key}' stopped")]
                } else {
                    vec![format!("No room '{key}'")]
                }
            }
        },
        "help" => vec![
            "status        list rooms".to_string(),
            "stop <room>   stop a room".to_string(),
            "quit          shut down".to_string(),
        ],
        other => vec![format!("Unknown command: {other}")],
    }
}

fn status_lines(registry: &Registry) -> Vec<String> {
    let rooms = registry.rooms();
    if rooms.is_empty() {
        return vec!["No active rooms.".to_string()];
    }

    let now = Utc::now();
    let mut out = vec![format!(
        "{:<20} {:<8} {:<8} {:>7} {:>8}",
        "ROOM", "GAME", "PHASE", "CLIENTS", "AGE"
    )];
    for r in rooms {
        let age = (now - r.created_at).num_seconds().max(0);
        out.push(format!(
            "{:<20} {:<8} {:<8} {:>7} {:>7}s",
            r.key,
            r.game.as_str(),
            format!("{:?}", r.phase),
            r.clients,
            age
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use arena_shared::{config::ServerConfig, net::ConnectionId};
    use tokio::sync::mpsc;

    use super::*;

    #[tokio::test]
    async fn status_and_stop() {
        let registry = Registry::new(ServerConfig {
            auto_spawn_every_ticks: 0,
            ..Default::default()
        });
        assert_eq!(exec_console(&registry, "status").await, vec!["No active rooms."]);

        let (tx, _rx) = mpsc::channel(4);
        registry
            .join("lobby", "balls", ConnectionId::new_unique(), tx)
            .await
            .unwrap();
        let lines = exec_console(&registry, "status").await;
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("lobby"));
        assert!(lines[1].contains("balls"));

        assert_eq!(
            exec_console(&registry, "stop lobby").await,
            vec!["Room 'lobby' stopped"]
        );
        assert_eq!(exec_console(&registry, "stop lobby").await, vec!["No room 'lobby'"]);
        assert!(exec_console(&registry, "   ").await.is_empty());
    }
}
