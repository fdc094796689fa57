//! # Tank Synchronization Server Library
//!
//! This library relays movement updates between the players of a
//! multiplayer tank game. Clients send small text datagrams over UDP; the
//! server orders them by the sender's timestamp and forwards each one to
//! every other registered player.
//!
//! ## Core Responsibilities
//!
//! ### Ingestion
//! A single task receives one datagram at a time, decodes it with the
//! `shared` wire codec and queues it for delivery. Registration updates
//! also add (or refresh) the sender in the player registry. Malformed
//! datagrams are logged and dropped.
//!
//! ### Ordered Delivery
//! Decoded updates wait in a min-heap keyed by origin timestamp. The
//! dispatch task sleeps until the heap is non-empty, then drains it
//! completely, broadcasting each update to every player except its sender.
//!
//! ### Best-Effort Fan-Out
//! The transport is lossy and nothing here compensates for that. A failed
//! send to one player is logged and counted, and the remaining players are
//! still served.
//!
//! ## Ordering Guarantees
//!
//! Updates are broadcast in non-decreasing timestamp order within one drain
//! pass. Ingestion keeps running while dispatch drains, so an update that
//! arrives after a newer one was already sent is delivered late rather than
//! reordered. A configurable reorder window narrows this gap by delaying each
//! drain pass.
//!
//! ## Module Organization
//!
//! - `network`: server context, ingestion/dispatch/eviction loops
//! - `queue`: timestamp-ordered delivery queue with wake-up signal
//! - `registry`: registered players and eviction policies
//! - `transport`: datagram endpoint abstraction over `tokio::net::UdpSocket`
//! - `shutdown`: stop flag observed by every loop
//! - `console`: operator commands on stdin
//! - `client_log`: `name ip` bookkeeping file
//! - `config`, `error`
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::bind(ServerConfig::default()).await?;
//!     let stop = server.stop_flag();
//!
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         stop.raise();
//!     });
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client_log;
pub mod config;
pub mod console;
pub mod error;
pub mod network;
pub mod queue;
pub mod registry;
pub mod shutdown;
pub mod transport;
