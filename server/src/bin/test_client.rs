use clap::Parser;
use log::{info, warn};
use rand::Rng;
use shared::{
    decode, encode, Direction, MovementState, Update, UpdateKind, MAX_DATAGRAM_SIZE, MAX_PLAYER_ID,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{interval, timeout};

/// Registers with the server, then wanders around sending movement updates
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address
    #[arg(short = 's', long, default_value = "127.0.0.1:8000")]
    server: String,

    /// Player id (0-9)
    #[arg(
        short = 'i',
        long,
        default_value_t = 1,
        value_parser = clap::value_parser!(u8).range(0..=MAX_PLAYER_ID as i64)
    )]
    id: u8,

    /// Display name sent with the registration
    #[arg(short = 'n', long, default_value = "tester")]
    name: String,

    /// Number of movement updates to send
    #[arg(short = 'c', long, default_value_t = 20)]
    count: u32,

    /// Milliseconds between updates
    #[arg(long, default_value_t = 100)]
    interval_ms: u64,
}

fn describe(update: &Update) -> String {
    match update.kind {
        UpdateKind::Registration => format!(
            "player {} registered as {:?} (t={})",
            update.player_id, update.display_name, update.timestamp
        ),
        UpdateKind::Movement => {
            let (dx, dy) = update.direction.offset();
            format!(
                "player {} {:?} {:?} step ({}, {}) (t={})",
                update.player_id, update.movement, update.direction, dx, dy, update.timestamp
            )
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let server_addr: SocketAddr = args.server.parse()?;

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    info!("Client socket bound to {}", socket.local_addr()?);

    let mut timestamp: u32 = 0;
    let registration = Update::registration(args.id, args.name.clone(), timestamp);
    socket.send_to(&encode(&registration), server_addr).await?;
    info!("Registered as player {} ({}) with {}", args.id, args.name, server_addr);

    let mut ticker = interval(Duration::from_millis(args.interval_ms));
    let mut buf = [0u8; MAX_DATAGRAM_SIZE];
    let mut rng = rand::thread_rng();
    let mut sent = 0;

    while sent < args.count {
        tokio::select! {
            _ = ticker.tick() => {
                timestamp += 1;
                let direction = Direction::ALL[rng.gen_range(0..Direction::ALL.len())];
                let movement = if direction == Direction::None {
                    MovementState::Idle
                } else {
                    MovementState::Moving
                };

                let update = Update::movement(args.id, movement, direction, timestamp);
                socket.send_to(&encode(&update), server_addr).await?;
                sent += 1;
            }
            received = socket.recv_from(&mut buf) => {
                let (len, _) = received?;
                match decode(&buf[..len]) {
                    Ok(update) => info!("Received: {}", describe(&update)),
                    Err(e) => warn!("Undecodable datagram: {}", e),
                }
            }
        }
    }

    // Collect stragglers from other players before exiting
    let linger = Duration::from_millis(500);
    while let Ok(Ok((len, _))) = timeout(linger, socket.recv_from(&mut buf)).await {
        if let Ok(update) = decode(&buf[..len]) {
            info!("Received: {}", describe(&update));
        }
    }

    info!("Sent {} movement updates", sent);
    Ok(())
}
