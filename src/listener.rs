//! TCP listen endpoints: accept loop, live session registry, rate sampler
//! and inactivity sweep.

use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use dashmap::DashMap;
use tokio::net::TcpListener as TokioTcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::ListenerConfig;
use crate::filters::FilterExpr;
use crate::session::{ClientSession, SessionContext};
use crate::stats::Stats;
use crate::status::ListenerStatus;
use crate::stream::DataStream;

/// Sessions idle longer than this are reaped by the sweep task.
const INACTIVITY_LIMIT_SECS: u64 = 15 * 60;
const INACTIVITY_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Live sessions of one listener, keyed by their monotone ids.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<u64, Arc<ClientSession>>,
}

impl SessionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, id: u64, session: Arc<ClientSession>) {
        self.sessions.insert(id, session);
    }

    pub fn remove(&self, id: u64) {
        self.sessions.remove(&id);
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Snapshot of the current sessions; collected so callers never hold
    /// map shards across awaits.
    pub fn all(&self) -> Vec<Arc<ClientSession>> {
        self.sessions.iter().map(|e| e.value().clone()).collect()
    }

    /// Other sessions currently using the given callsign (case-sensitive).
    pub fn sessions_with_callsign(&self, excluding: u64, callsign: &str) -> Vec<Arc<ClientSession>> {
        if callsign.is_empty() {
            return Vec::new();
        }
        self.sessions
            .iter()
            .filter(|e| *e.key() != excluding && e.value().callsign() == callsign)
            .map(|e| e.value().clone())
            .collect()
    }
}

pub struct Listener {
    config: ListenerConfig,
    ctx: Arc<SessionContext>,
    registry: Arc<SessionRegistry>,
    stats: Arc<Stats>,
    online: AtomicUsize,
    peak: AtomicUsize,
    next_session_id: AtomicU64,
    cancel: CancellationToken,
    bound_addr: std::sync::OnceLock<std::net::SocketAddr>,
}

impl Listener {
    pub fn new(
        config: ListenerConfig,
        server_id: String,
        max_line_len: usize,
        stream: Arc<DataStream>,
        global_stats: Arc<Stats>,
    ) -> Arc<Self> {
        let registry = SessionRegistry::new();
        let stats = Arc::new(Stats::new());

        let listener_filter = if config.filter.trim().is_empty() {
            None
        } else {
            FilterExpr::from_str(&config.filter).ok()
        };

        let ctx = Arc::new(SessionContext {
            server_id,
            listener_name: config.name.clone(),
            mode: config.mode,
            listener_filter,
            max_line_len,
            stream,
            registry: registry.clone(),
            listener_stats: stats.clone(),
            global_stats,
        });

        Arc::new(Self {
            config,
            ctx,
            registry,
            stats,
            online: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            next_session_id: AtomicU64::new(1),
            cancel: CancellationToken::new(),
            bound_addr: std::sync::OnceLock::new(),
        })
    }

    /// Bind and spawn the accept loop, sampler and inactivity sweep.
    pub async fn start(self: Arc<Self>) -> Result<()> {
        let socket = TokioTcpListener::bind(self.config.addr())
            .await
            .with_context(|| format!("Failed to bind {}", self.config.addr()))?;
        let addr = socket.local_addr().context("No local address")?;
        let _ = self.bound_addr.set(addr);

        info!(
            listener = %self.config.name,
            mode = %self.config.mode,
            %addr,
            "APRS listening"
        );

        tokio::spawn(self.clone().accept_loop(socket));
        tokio::spawn(self.clone().sampler_loop());
        tokio::spawn(self.clone().inactivity_sweep());
        Ok(())
    }

    /// Close the listen socket, then every registered session.
    pub async fn stop(&self) {
        self.cancel.cancel();
        for session in self.registry.all() {
            session.close().await;
        }
        debug!(listener = %self.config.name, "Listener stopped");
    }

    /// Actual bound address; differs from config when port 0 was requested.
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.bound_addr.get().copied()
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn is_visible(&self) -> bool {
        self.config.visible
    }

    pub fn snapshot(&self) -> ListenerStatus {
        ListenerStatus {
            name: self.config.name.clone(),
            mode: self.config.mode,
            addr: self
                .local_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|| self.config.addr()),
            filter: self.config.filter.clone(),
            online: self.online.load(Ordering::Relaxed),
            peak: self.peak.load(Ordering::Relaxed),
            stats: self.stats.snapshot(),
            sessions: self.registry.all().iter().map(|s| s.snapshot()).collect(),
        }
    }

    async fn accept_loop(self: Arc<Self>, socket: TokioTcpListener) {
        loop {
            let accepted = tokio::select! {
                _ = self.cancel.cancelled() => break,
                r = socket.accept() => r,
            };

            match accepted {
                Ok((stream, addr)) => {
                    let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        listener = %self.config.name,
                        client = %addr,
                        session = id,
                        "Accepted connection"
                    );
                    metrics::counter!("listener.connections.accepted_total").increment(1);
                    metrics::gauge!("listener.connections.active").increment(1.0);

                    // The session registers itself in the shared registry
                    ClientSession::spawn(stream, id, self.ctx.clone());
                }
                Err(e) => {
                    if self.cancel.is_cancelled() {
                        break;
                    }
                    error!(
                        listener = %self.config.name,
                        error = %e,
                        "Error accepting incoming client connection"
                    );
                }
            }
        }
        debug!(listener = %self.config.name, "Accept loop ended");
    }

    /// 1 Hz: roll this listener's and every session's rate windows, refresh
    /// the online/peak gauges.
    async fn sampler_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            self.stats.sample();
            for session in self.registry.all() {
                session.stats().sample();
            }

            let online = self.registry.len();
            self.online.store(online, Ordering::Relaxed);
            self.peak.fetch_max(online, Ordering::Relaxed);
        }
    }

    async fn inactivity_sweep(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(INACTIVITY_SWEEP_INTERVAL);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            for session in self.registry.all() {
                if session.idle_secs() > INACTIVITY_LIMIT_SECS {
                    debug!(
                        listener = %self.config.name,
                        session = session.id,
                        "Closing inactive session"
                    );
                    session.close().await;
                }
            }
        }
    }
}
