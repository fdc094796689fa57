//! Operator console read from standard input.
//!
//! Runs on a dedicated OS thread: stdin reads block, and the only effect the
//! console has on the server is raising the stop flag or reading the
//! registry.

use crate::registry::PlayerRegistry;
use crate::shutdown::StopFlag;
use log::{info, warn};
use std::io::{self, BufRead};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Stop,
    Players,
    Help,
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "stop" | "quit" | "exit" => Some(ConsoleCommand::Stop),
            "players" | "list" => Some(ConsoleCommand::Players),
            "help" | "?" => Some(ConsoleCommand::Help),
            _ => None,
        }
    }
}

/// Handles console lines until `stop` is entered or input ends.
///
/// Must not be called from inside the async runtime; it takes blocking
/// read locks on the registry.
pub fn run_console<R: BufRead>(input: R, stop: &StopFlag, registry: &RwLock<PlayerRegistry>) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Console input failed: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match ConsoleCommand::parse(&line) {
            Some(ConsoleCommand::Stop) => {
                stop.raise();
                break;
            }
            Some(ConsoleCommand::Players) => {
                let players = registry.blocking_read().snapshot_all();
                info!("{} registered players", players.len());
                for player in players {
                    info!(
                        "  {} {:?} {} {:?} {:?}",
                        player.id, player.name, player.addr, player.movement, player.direction
                    );
                }
            }
            Some(ConsoleCommand::Help) => {
                info!("Commands: stop | players | help");
            }
            None => warn!("Unknown console command: {}", line.trim()),
        }

        if stop.is_raised() {
            break;
        }
    }
}

/// Starts the console on its own thread, reading from stdin.
pub fn spawn_console(
    stop: Arc<StopFlag>,
    registry: Arc<RwLock<PlayerRegistry>>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("console".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            run_console(stdin.lock(), &stop, &registry);
        })
}
