//! Server network layer: datagram ingestion and timestamp-ordered fan-out

use crate::client_log::ClientLog;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::queue::DeliveryQueue;
use crate::registry::{Player, PlayerRegistry};
use crate::shutdown::StopFlag;
use crate::transport::{is_peer_error, Transport};
use log::{debug, error, info, warn};
use shared::{decode, encode, Update, MAX_DATAGRAM_SIZE};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::RwLock;
use tokio::time::{interval, sleep, MissedTickBehavior};

/// What the dispatch loop is currently doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    /// Queue observed empty, blocked until the next push
    Waiting,
    /// Popping and broadcasting queued updates
    Draining,
}

/// Outcome of fanning one update out to its recipients
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: Vec<u8>,
    pub failed: Vec<u8>,
}

impl BroadcastReport {
    pub fn sends(&self) -> usize {
        self.delivered.len() + self.failed.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// State shared by the ingestion, dispatch and eviction tasks
pub struct ServerContext<T> {
    pub transport: Arc<T>,
    pub registry: Arc<RwLock<PlayerRegistry>>,
    pub queue: Arc<DeliveryQueue>,
    pub stop: Arc<StopFlag>,
    pub client_log: Arc<ClientLog>,
    draining: Arc<AtomicBool>,
}

impl<T> Clone for ServerContext<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            registry: Arc::clone(&self.registry),
            queue: Arc::clone(&self.queue),
            stop: Arc::clone(&self.stop),
            client_log: Arc::clone(&self.client_log),
            draining: Arc::clone(&self.draining),
        }
    }
}

impl<T: Transport> ServerContext<T> {
    pub fn new(transport: T, registry: PlayerRegistry, client_log: ClientLog) -> Self {
        Self {
            transport: Arc::new(transport),
            registry: Arc::new(RwLock::new(registry)),
            queue: Arc::new(DeliveryQueue::new()),
            stop: Arc::new(StopFlag::new()),
            client_log: Arc::new(client_log),
            draining: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn dispatch_state(&self) -> DispatchState {
        if self.draining.load(Ordering::SeqCst) {
            DispatchState::Draining
        } else {
            DispatchState::Waiting
        }
    }

    fn set_dispatch_state(&self, state: DispatchState) {
        self.draining
            .store(state == DispatchState::Draining, Ordering::SeqCst);
    }

    /// Decodes one datagram and hands it to the dispatch loop
    ///
    /// Registrations are recorded in the registry and the client log first.
    /// A malformed datagram is rejected before anything is touched.
    pub async fn ingest(&self, bytes: &[u8], addr: SocketAddr) -> Result<Update, ServerError> {
        debug!("RECV {}: {}", addr, String::from_utf8_lossy(bytes));
        let update = decode(bytes)?;

        if update.is_registration() {
            {
                let mut registry = self.registry.write().await;
                registry.upsert(&update, addr);
            }
            self.client_log.record(&update.display_name, addr).await;
        } else {
            let known = {
                let mut registry = self.registry.write().await;
                registry.observe(&update)
            };
            if !known {
                debug!("Update from unregistered player {}", update.player_id);
            }
        }

        self.queue.push(update.clone());
        Ok(update)
    }

    /// Sends an update to every registered player except its sender
    ///
    /// Recipients come from a registry snapshot, so no lock is held while
    /// sending. A failed send is logged and the fan-out carries on.
    pub async fn broadcast(&self, update: &Update) -> BroadcastReport {
        let payload = encode(update);
        let recipients: Vec<Player> = {
            let registry = self.registry.read().await;
            registry.snapshot_all()
        };

        let mut report = BroadcastReport::default();
        for player in recipients.iter().filter(|p| p.id != update.player_id) {
            match self.transport.send_to(&payload, player.addr).await {
                Ok(_) => report.delivered.push(player.id),
                Err(source) => {
                    let err = ServerError::Send {
                        player_id: player.id,
                        addr: player.addr,
                        source,
                    };
                    error!("{}", err);
                    report.failed.push(player.id);
                }
            }
        }

        if report.sends() > 0 {
            let mut registry = self.registry.write().await;
            for id in &report.delivered {
                registry.record_send_success(*id);
            }
            for id in &report.failed {
                registry.record_send_failure(*id);
            }
        }

        if report.is_success() {
            debug!(
                "SEND {} to {} players",
                String::from_utf8_lossy(&payload),
                report.delivered.len()
            );
        }
        report
    }

    /// Broadcasts queued updates in timestamp order until the queue is empty
    ///
    /// Returns the number of updates dispatched. Stops early if the stop
    /// flag is raised.
    pub async fn drain(&self) -> usize {
        self.set_dispatch_state(DispatchState::Draining);

        let mut dispatched = 0;
        while !self.stop.is_raised() {
            let Some(update) = self.queue.pop_min() else {
                break;
            };
            self.broadcast(&update).await;
            dispatched += 1;
        }

        self.set_dispatch_state(DispatchState::Waiting);
        dispatched
    }
}

/// Receives datagrams until the stop flag is raised
///
/// Malformed datagrams are dropped. A receive error other than a
/// peer-reported one ends the loop and is returned.
pub async fn run_ingestion<T: Transport>(ctx: ServerContext<T>) -> Result<(), ServerError> {
    let mut buffer = [0u8; MAX_DATAGRAM_SIZE];

    while !ctx.stop.is_raised() {
        let received = tokio::select! {
            result = ctx.transport.recv_from(&mut buffer) => result,
            _ = ctx.stop.wait() => break,
        };

        let (len, addr) = match received {
            Ok(received) => received,
            Err(e) if is_peer_error(&e) => {
                debug!("Ignoring peer error on receive: {}", e);
                continue;
            }
            Err(e) => {
                error!("Error receiving datagram: {}", e);
                return Err(ServerError::Transport(e));
            }
        };

        if let Err(e) = ctx.ingest(&buffer[..len], addr).await {
            warn!("Discarding datagram from {}: {}", addr, e);
        }
    }

    info!("Ingestion loop stopped");
    Ok(())
}

/// Drains the delivery queue each time it becomes non-empty
///
/// With a non-zero `reorder_window` the loop waits that long after waking,
/// so updates from the same burst are ordered within one drain pass.
pub async fn run_dispatch<T: Transport>(ctx: ServerContext<T>, reorder_window: Duration) {
    while ctx.queue.wait_for_updates(&ctx.stop).await {
        if !reorder_window.is_zero() {
            tokio::select! {
                _ = sleep(reorder_window) => {}
                _ = ctx.stop.wait() => break,
            }
        }

        let dispatched = ctx.drain().await;
        debug!("Drain pass dispatched {} updates", dispatched);
    }

    info!("Dispatch loop stopped");
}

/// Periodically removes players rejected by the registry's eviction policy
pub async fn run_eviction<T: Transport>(ctx: ServerContext<T>, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = ctx.stop.wait() => break,
        }

        let evicted = {
            let mut registry = ctx.registry.write().await;
            registry.evict(Instant::now())
        };
        for player in evicted {
            info!(
                "Evicted player {} ({:?}) at {}",
                player.id, player.name, player.addr
            );
        }
    }
}

/// Synchronization server owning the transport and the shared state
pub struct Server<T: Transport = UdpSocket> {
    ctx: ServerContext<T>,
    config: ServerConfig,
}

impl Server<UdpSocket> {
    /// Binds the UDP socket and prepares the client log
    ///
    /// Failing to bind is fatal and returned to the caller. A client log
    /// that cannot be created only disables bookkeeping.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let socket = UdpSocket::bind(config.bind_addr()).await?;
        info!("Server listening on {}", socket.local_addr()?);

        let client_log = ClientLog::open_or_disabled(config.client_log.as_deref()).await;
        let registry = PlayerRegistry::with_policy(config.eviction.policy());

        Ok(Self::with_context(
            ServerContext::new(socket, registry, client_log),
            config,
        ))
    }
}

impl<T: Transport> Server<T> {
    pub fn with_context(ctx: ServerContext<T>, config: ServerConfig) -> Self {
        Self { ctx, config }
    }

    pub fn context(&self) -> ServerContext<T> {
        self.ctx.clone()
    }

    pub fn stop_flag(&self) -> Arc<StopFlag> {
        Arc::clone(&self.ctx.stop)
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.ctx.transport.local_addr()
    }

    /// Runs ingestion, dispatch and eviction until the stop flag is raised
    ///
    /// If ingestion ends on its own (a transport fault) the flag is raised
    /// so the other tasks exit too, and the fault is returned.
    pub async fn run(self) -> Result<(), ServerError> {
        let ingestion = tokio::spawn(run_ingestion(self.ctx.clone()));
        let dispatch = tokio::spawn(run_dispatch(
            self.ctx.clone(),
            self.config.reorder_window,
        ));
        let eviction = tokio::spawn(run_eviction(
            self.ctx.clone(),
            self.config.eviction_interval,
        ));

        info!("Server started successfully");

        let result = ingestion.await;
        self.ctx.stop.raise();

        dispatch.await?;
        eviction.await?;

        info!("Server shutting down");
        result?
    }
}
