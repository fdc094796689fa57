//! Player registry for the synchronization server
//!
//! This module tracks every player that has announced itself with a
//! registration update:
//! - Player id to reply address mapping used for fan-out
//! - Display name and last observed movement state
//! - Activity and send-failure bookkeeping for eviction
//!
//! Players are keyed by the id they pick for themselves on the wire, so a
//! repeated registration simply replaces the previous entry. This is how a
//! client that reconnects from a new address gets its endpoint updated.

use log::{debug, info};
use shared::{Direction, MovementState, Update};
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A registered participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    /// Identifier chosen by the client
    pub id: u8,
    /// Endpoint broadcasts are sent to
    pub addr: SocketAddr,
    pub name: String,
    pub movement: MovementState,
    pub direction: Direction,
    /// Last time any update from this player was ingested
    pub last_seen: Instant,
    /// Sends that failed in a row since the last successful one
    pub send_failures: u32,
}

impl Player {
    /// Creates a player from a registration update
    pub fn from_registration(update: &Update, addr: SocketAddr) -> Self {
        Self {
            id: update.player_id,
            addr,
            name: update.display_name.clone(),
            movement: update.movement,
            direction: update.direction,
            last_seen: Instant::now(),
            send_failures: 0,
        }
    }

    /// Returns true if nothing was heard from this player within `timeout`
    pub fn is_idle(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) > timeout
    }
}

/// Decides when a player should be dropped from the registry
///
/// The wire protocol has no leave message, so departure can only be
/// inferred. The policy is consulted by the periodic eviction sweep.
pub trait EvictionPolicy: Send + Sync + fmt::Debug {
    fn should_evict(&self, player: &Player, now: Instant) -> bool;
}

/// Keeps every player for the lifetime of the server
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverEvict;

impl EvictionPolicy for NeverEvict {
    fn should_evict(&self, _player: &Player, _now: Instant) -> bool {
        false
    }
}

/// Evicts players that have sent nothing for the given duration
#[derive(Debug, Clone, Copy)]
pub struct IdleTimeout(pub Duration);

impl EvictionPolicy for IdleTimeout {
    fn should_evict(&self, player: &Player, now: Instant) -> bool {
        player.is_idle(now, self.0)
    }
}

/// Evicts players after this many consecutive failed sends
#[derive(Debug, Clone, Copy)]
pub struct SendFailureLimit(pub u32);

impl EvictionPolicy for SendFailureLimit {
    fn should_evict(&self, player: &Player, _now: Instant) -> bool {
        player.send_failures >= self.0
    }
}

/// All registered players, indexed by player id
#[derive(Debug)]
pub struct PlayerRegistry {
    players: HashMap<u8, Player>,
    policy: Box<dyn EvictionPolicy>,
}

impl Default for PlayerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::with_policy(Box::new(NeverEvict))
    }

    pub fn with_policy(policy: Box<dyn EvictionPolicy>) -> Self {
        Self {
            players: HashMap::new(),
            policy,
        }
    }

    /// Inserts or replaces the player named by a registration update
    ///
    /// Returns true if the id was not registered before. Updates that are
    /// not registrations leave the registry untouched.
    pub fn upsert(&mut self, update: &Update, addr: SocketAddr) -> bool {
        if !update.is_registration() {
            debug!(
                "Ignoring non-registration update from player {}",
                update.player_id
            );
            return false;
        }

        let player = Player::from_registration(update, addr);
        match self.players.insert(player.id, player) {
            Some(previous) => {
                info!(
                    "Player {} re-registered as {:?} from {} (was {})",
                    update.player_id, update.display_name, addr, previous.addr
                );
                false
            }
            None => {
                info!(
                    "Player {} registered as {:?} from {}",
                    update.player_id, update.display_name, addr
                );
                true
            }
        }
    }

    /// Records the movement state carried by an update from a known player
    ///
    /// Returns false if the sender has never registered.
    pub fn observe(&mut self, update: &Update) -> bool {
        match self.players.get_mut(&update.player_id) {
            Some(player) => {
                player.movement = update.movement;
                player.direction = update.direction;
                player.last_seen = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Returns a copy of the player registered under `player_id`
    pub fn lookup(&self, player_id: u8) -> Option<Player> {
        self.players.get(&player_id).cloned()
    }

    /// Copies every player, ordered by id
    ///
    /// The copy is detached from the registry, so callers can iterate it
    /// (and perform slow sends) without holding any lock.
    pub fn snapshot_all(&self) -> Vec<Player> {
        let mut players: Vec<Player> = self.players.values().cloned().collect();
        players.sort_by_key(|player| player.id);
        players
    }

    /// Counts one more consecutive failed send to this player
    pub fn record_send_failure(&mut self, player_id: u8) {
        if let Some(player) = self.players.get_mut(&player_id) {
            player.send_failures = player.send_failures.saturating_add(1);
        }
    }

    /// Resets the consecutive send-failure count
    pub fn record_send_success(&mut self, player_id: u8) {
        if let Some(player) = self.players.get_mut(&player_id) {
            player.send_failures = 0;
        }
    }

    /// Removes and returns every player the eviction policy rejects
    pub fn evict(&mut self, now: Instant) -> Vec<Player> {
        let doomed: Vec<u8> = self
            .players
            .values()
            .filter(|player| self.policy.should_evict(player, now))
            .map(|player| player.id)
            .collect();

        doomed
            .into_iter()
            .filter_map(|id| self.players.remove(&id))
            .collect()
    }

    /// Number of registered players
    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}
