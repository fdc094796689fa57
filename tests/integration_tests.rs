//! Integration tests for the synchronization server
//!
//! These tests run a real server on a loopback UDP socket and talk to it
//! through ordinary client sockets.

use server::config::ServerConfig;
use server::network::{Server, ServerContext};
use shared::{decode, encode, Direction, MovementState, Update, UpdateKind, MAX_DATAGRAM_SIZE};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

type ServerHandle = JoinHandle<Result<(), server::error::ServerError>>;

fn loopback_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        client_log: None,
        ..Default::default()
    }
}

async fn start_server(
    config: ServerConfig,
) -> (SocketAddr, ServerContext<UdpSocket>, ServerHandle) {
    let server = Server::bind(config).await.expect("bind server");
    let addr = server.local_addr().unwrap();
    let ctx = server.context();
    let handle = tokio::spawn(server.run());
    (addr, ctx, handle)
}

async fn stop_server(ctx: &ServerContext<UdpSocket>, handle: ServerHandle) {
    ctx.stop.raise();
    let joined = timeout(Duration::from_secs(2), handle)
        .await
        .expect("server did not shut down");
    let result = tokio_test::assert_ok!(joined);
    tokio_test::assert_ok!(result);
}

async fn wait_for_players(ctx: &ServerContext<UdpSocket>, count: usize) {
    timeout(Duration::from_secs(2), async {
        while ctx.registry.read().await.len() < count {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("players did not register");
}

/// Receives until the socket stays quiet, returning every decoded update
async fn collect_updates(socket: &UdpSocket, quiet: Duration) -> Vec<Update> {
    let mut buf = [0u8; MAX_DATAGRAM_SIZE];
    let mut updates = Vec::new();
    while let Ok(Ok((len, _))) = timeout(quiet, socket.recv_from(&mut buf)).await {
        updates.push(decode(&buf[..len]).expect("server sent malformed payload"));
    }
    updates
}

async fn register(server_addr: SocketAddr, id: u8, name: &str) -> UdpSocket {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let update = Update::registration(id, name, 0);
    socket.send_to(&encode(&update), server_addr).await.unwrap();
    socket
}

/// BROADCAST TESTS
mod broadcast_tests {
    use super::*;

    /// Player 1 moves; players 2 and 3 each see it exactly once, player 1 never does
    #[tokio::test]
    async fn movement_reaches_every_other_player() {
        let (server_addr, ctx, handle) = start_server(loopback_config()).await;

        let p1 = register(server_addr, 1, "one").await;
        let p2 = register(server_addr, 2, "two").await;
        let p3 = register(server_addr, 3, "three").await;
        wait_for_players(&ctx, 3).await;

        let movement = Update::movement(1, MovementState::Moving, Direction::NorthEast, 100);
        p1.send_to(&encode(&movement), server_addr).await.unwrap();

        let quiet = Duration::from_millis(200);
        for peer in [&p2, &p3] {
            let received: Vec<Update> = collect_updates(peer, quiet)
                .await
                .into_iter()
                .filter(|u| u.kind == UpdateKind::Movement)
                .collect();
            assert_eq!(received, vec![movement.clone()]);
        }

        let echoed = collect_updates(&p1, quiet)
            .await
            .into_iter()
            .any(|u| u.player_id == 1);
        assert!(!echoed, "sender received its own update");

        stop_server(&ctx, handle).await;
    }

    /// Re-registering from a new socket moves the player's endpoint
    #[tokio::test]
    async fn reregistration_updates_endpoint() {
        let (server_addr, ctx, handle) = start_server(loopback_config()).await;

        let old = register(server_addr, 4, "four").await;
        wait_for_players(&ctx, 1).await;
        let new = register(server_addr, 4, "four").await;
        let new_addr = new.local_addr().unwrap();

        timeout(Duration::from_secs(2), async {
            while ctx.registry.read().await.lookup(4).map(|p| p.addr) != Some(new_addr) {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("endpoint was not replaced");
        assert_eq!(ctx.registry.read().await.len(), 1);

        let sender = register(server_addr, 5, "five").await;
        wait_for_players(&ctx, 2).await;
        let movement = Update::movement(5, MovementState::Moving, Direction::South, 3);
        sender.send_to(&encode(&movement), server_addr).await.unwrap();

        let quiet = Duration::from_millis(200);
        let at_new = collect_updates(&new, quiet).await;
        assert!(at_new.contains(&movement));
        let at_old = collect_updates(&old, quiet).await;
        assert!(!at_old.contains(&movement));

        stop_server(&ctx, handle).await;
    }

    /// Garbage datagrams are dropped without disturbing later traffic
    #[tokio::test]
    async fn malformed_datagrams_are_ignored() {
        let (server_addr, ctx, handle) = start_server(loopback_config()).await;

        let p1 = register(server_addr, 1, "one").await;
        let p2 = register(server_addr, 2, "two").await;
        wait_for_players(&ctx, 2).await;

        p1.send_to(b"not an update", server_addr).await.unwrap();
        p1.send_to(b"", server_addr).await.unwrap();
        p1.send_to(b"9999", server_addr).await.unwrap();

        let movement = Update::movement(1, MovementState::Idle, Direction::None, 8);
        p1.send_to(&encode(&movement), server_addr).await.unwrap();

        let received = collect_updates(&p2, Duration::from_millis(200)).await;
        assert!(received.contains(&movement));
        assert_eq!(ctx.registry.read().await.len(), 2);

        stop_server(&ctx, handle).await;
    }
}

/// ORDERING TESTS
mod ordering_tests {
    use super::*;

    /// A burst sent out of order is delivered sorted when it lands in one drain pass
    #[tokio::test]
    async fn burst_is_delivered_in_timestamp_order() {
        let config = ServerConfig {
            reorder_window: Duration::from_millis(100),
            ..loopback_config()
        };
        let (server_addr, ctx, handle) = start_server(config).await;

        let p1 = register(server_addr, 1, "one").await;
        let p2 = register(server_addr, 2, "two").await;
        wait_for_players(&ctx, 2).await;
        // Let the registration broadcasts drain before the burst
        collect_updates(&p1, Duration::from_millis(150)).await;
        collect_updates(&p2, Duration::from_millis(150)).await;

        for timestamp in [40, 10, 30, 20, 50] {
            let update = Update::movement(1, MovementState::Moving, Direction::East, timestamp);
            p1.send_to(&encode(&update), server_addr).await.unwrap();
        }

        let timestamps: Vec<u32> = collect_updates(&p2, Duration::from_millis(300))
            .await
            .into_iter()
            .map(|u| u.timestamp)
            .collect();
        assert_eq!(timestamps, vec![10, 20, 30, 40, 50]);

        stop_server(&ctx, handle).await;
    }
}

/// LIFECYCLE TESTS
mod lifecycle_tests {
    use super::*;

    /// Stopping an idle server wakes the blocked loops
    #[tokio::test]
    async fn idle_server_stops_promptly() {
        let (_, ctx, handle) = start_server(loopback_config()).await;
        sleep(Duration::from_millis(20)).await;
        stop_server(&ctx, handle).await;
    }

    /// Binding a port that is already taken fails at startup
    #[tokio::test]
    async fn bind_conflict_is_fatal() {
        let taken = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let config = ServerConfig {
            port: taken.local_addr().unwrap().port(),
            ..loopback_config()
        };

        assert!(Server::bind(config).await.is_err());
    }
}
