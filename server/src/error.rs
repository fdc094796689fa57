use shared::DecodeError;
use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Failures surfaced by the ingestion and dispatch paths.
///
/// None of these are retried: a malformed datagram is dropped, a failed send
/// skips one recipient, and a transport fault ends the loop that hit it.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("malformed message: {0}")]
    Malformed(#[from] DecodeError),

    #[error("send to player {player_id} at {addr} failed: {source}")]
    Send {
        player_id: u8,
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("transport fault: {0}")]
    Transport(#[from] io::Error),

    #[error("server task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ServerError {
    pub fn is_malformed(&self) -> bool {
        matches!(self, ServerError::Malformed(_))
    }
}
