//! One accepted client connection: handshake, packet ingest, fan-out and
//! heartbeat.
//!
//! The server speaks first (banner), then classifies each line as a login
//! command, a comment, or APRS data. Data from verified sessions runs
//! through dedupe, parse and the q algorithm before being published to the
//! stream tagged with the client's callsign.

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::ListenerMode;
use crate::dup_cache::{DupCache, epoch_secs, fnv1a_64};
use crate::filters::FilterExpr;
use crate::listener::SessionRegistry;
use crate::packet;
use crate::passcode::passcode;
use crate::q_construct::{self, QContext};
use crate::stats::Stats;
use crate::status::SessionStatus;
use crate::stream::DataStream;
use crate::{CODENAME, PRODUCT_NAME, VERSION};

/// Seconds a connection may sit without a login attempt.
pub const LOGIN_GRACE_SECS: u64 = 30;
/// Idle read deadline; expiry is recoverable once logged in.
pub const READ_TIMEOUT_SECS: u64 = 60;
/// Per-session duplicate suppression window.
pub const DUP_WINDOW_SECS: u64 = 30;

const HEARTBEAT_INTERVAL_SECS: u64 = 30;
const HEARTBEAT_IDLE_SECS: u64 = 20;
const HEARTBEAT_ATTEMPTS: u32 = 3;
const HEARTBEAT_BACKOFF: Duration = Duration::from_secs(2);

/// Listener-scoped environment shared by all of its sessions.
pub struct SessionContext {
    pub server_id: String,
    pub listener_name: String,
    pub mode: ListenerMode,
    /// Pre-parsed listener filter; takes precedence over session filters
    pub listener_filter: Option<FilterExpr>,
    pub max_line_len: usize,
    pub stream: Arc<DataStream>,
    pub registry: Arc<SessionRegistry>,
    pub listener_stats: Arc<Stats>,
    pub global_stats: Arc<Stats>,
}

#[derive(Default)]
struct Identity {
    callsign: String,
    software: String,
    version: String,
    filter_raw: String,
    filter: Option<FilterExpr>,
}

pub struct ClientSession {
    pub id: u64,
    remote: SocketAddr,
    connected_at: DateTime<Utc>,
    ctx: Arc<SessionContext>,
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    verified: AtomicBool,
    logged_in: AtomicBool,
    last_active: AtomicU64,
    ident: RwLock<Identity>,
    dups: std::sync::Mutex<DupCache>,
    stats: Arc<Stats>,
    cancel: CancellationToken,
}

impl ClientSession {
    /// Register the session on the stream and spawn its read, fan-out and
    /// heartbeat tasks.
    pub fn spawn(socket: TcpStream, id: u64, ctx: Arc<SessionContext>) -> Arc<Self> {
        let remote = socket
            .peer_addr()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 0)));
        let (read_half, write_half) = socket.into_split();

        let session = Arc::new(Self {
            id,
            remote,
            connected_at: Utc::now(),
            writer: tokio::sync::Mutex::new(Some(write_half)),
            verified: AtomicBool::new(false),
            logged_in: AtomicBool::new(false),
            last_active: AtomicU64::new(epoch_secs()),
            ident: RwLock::new(Identity::default()),
            dups: std::sync::Mutex::new(DupCache::new()),
            stats: Arc::new(Stats::new()),
            cancel: CancellationToken::new(),
            ctx: ctx.clone(),
        });

        // Register before the read task can possibly unwind and deregister
        ctx.registry.insert(id, session.clone());

        let subscription = ctx.stream.subscribe();
        tokio::spawn(session.clone().run_read(read_half));
        tokio::spawn(session.clone().run_subscriber(subscription));
        tokio::spawn(session.clone().run_heartbeat());

        session
    }

    /// Write one line to the client. Appends `\n`, fails once the socket has
    /// been cleared, and accrues byte counters on success.
    pub async fn send(&self, line: &str) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or_else(|| anyhow!("connection closed"))?;
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        drop(guard);

        let n = line.len() as u64 + 1;
        for s in self.scopes() {
            s.add_sent_bytes(n);
        }
        Ok(())
    }

    /// Idempotent teardown: cancels the session tasks and drops the write
    /// half, which sends FIN to the client.
    pub async fn close(&self) {
        self.cancel.cancel();
        let mut guard = self.writer.lock().await;
        *guard = None;
    }

    pub fn callsign(&self) -> String {
        self.ident_read().callsign.clone()
    }

    pub fn is_verified(&self) -> bool {
        self.verified.load(Ordering::Relaxed)
    }

    pub fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::Relaxed)
    }

    pub fn idle_secs(&self) -> u64 {
        epoch_secs().saturating_sub(self.last_active.load(Ordering::Relaxed))
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn snapshot(&self) -> SessionStatus {
        let ident = self.ident_read();
        let last_active = DateTime::<Utc>::from_timestamp(
            self.last_active.load(Ordering::Relaxed) as i64,
            0,
        )
        .unwrap_or(self.connected_at);

        SessionStatus {
            id: self.id,
            listener: self.ctx.listener_name.clone(),
            callsign: ident.callsign.clone(),
            addr: self.remote.to_string(),
            verified: self.is_verified(),
            logged_in: self.is_logged_in(),
            connected_at: self.connected_at,
            last_active,
            software: ident.software.clone(),
            version: ident.version.clone(),
            filter: ident.filter_raw.clone(),
            stats: self.stats.snapshot(),
        }
    }

    fn ident_read(&self) -> std::sync::RwLockReadGuard<'_, Identity> {
        match self.ident.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Session, listener and global counter scopes, in that order.
    fn scopes(&self) -> [&Stats; 3] {
        [
            self.stats.as_ref(),
            self.ctx.listener_stats.as_ref(),
            self.ctx.global_stats.as_ref(),
        ]
    }

    fn touch(&self) {
        self.last_active.store(epoch_secs(), Ordering::Relaxed);
    }

    async fn run_read(self: Arc<Self>, read_half: OwnedReadHalf) {
        debug!(
            client = %self.remote,
            listener = %self.ctx.listener_name,
            "New client connected"
        );

        let banner = format!("# {} {}/{}", PRODUCT_NAME, VERSION, CODENAME);
        let _ = self.send(&banner).await;

        let mut reader = BufReader::new(read_half);
        let mut line = String::new();
        let mut first_line = true;

        loop {
            line.clear();

            let deadline = if self.is_logged_in() {
                Duration::from_secs(READ_TIMEOUT_SECS)
            } else {
                let elapsed = (Utc::now() - self.connected_at).num_seconds().max(0) as u64;
                Duration::from_secs(LOGIN_GRACE_SECS.saturating_sub(elapsed).max(1))
            };

            let read = tokio::select! {
                _ = self.cancel.cancelled() => break,
                r = timeout(deadline, reader.read_line(&mut line)) => r,
            };

            match read {
                Err(_) => {
                    if !self.is_logged_in() {
                        debug!(client = %self.remote, "No login within grace period");
                        break;
                    }
                    continue;
                }
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => {
                    for s in self.scopes() {
                        s.add_received_bytes(n as u64);
                    }
                    if n > self.ctx.max_line_len {
                        debug!(client = %self.remote, bytes = n, "Oversized line, closing");
                        for s in self.scopes() {
                            s.inc_received_errors();
                        }
                        break;
                    }

                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    // A browser pointed at an APRS port: close without reply
                    if first_line && trimmed.contains("HTTP/") {
                        debug!(client = %self.remote, "HTTP probe, closing");
                        break;
                    }
                    first_line = false;

                    self.touch();
                    self.process_line(trimmed).await;
                }
                Ok(Err(e)) => {
                    debug!(client = %self.remote, error = %e, "Read error");
                    break;
                }
            }
        }

        self.ctx.registry.remove(self.id);
        self.close().await;
        metrics::gauge!("listener.connections.active").decrement(1.0);
        debug!(client = %self.remote, "Client disconnected");
    }

    async fn process_line(&self, line: &str) {
        if line.starts_with("user ") {
            self.handle_login(line).await;
        } else if line.starts_with('#') {
            let _ = self.send("# pong").await;
        } else if line.contains('>') {
            self.handle_data(line).await;
        } else {
            let _ = self.send("# invalid packet").await;
            for s in self.scopes() {
                s.inc_received_errors();
            }
        }
    }

    async fn handle_login(&self, line: &str) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 4 || parts[0] != "user" {
            let _ = self.send("# invalid login").await;
            return;
        }

        let callsign = parts[1].to_string();
        let mut pass_str = "";
        let mut software = String::new();
        let mut version = String::new();
        let mut filter_raw = String::new();

        let mut i = 2;
        while i < parts.len() {
            match parts[i] {
                "pass" => {
                    if let Some(v) = parts.get(i + 1) {
                        pass_str = v;
                        i += 2;
                    } else {
                        i += 1;
                    }
                }
                "vers" => {
                    if let Some(v) = parts.get(i + 1) {
                        software = v.to_string();
                    }
                    if let Some(v) = parts.get(i + 2) {
                        version = v.to_string();
                    }
                    i += 3;
                }
                "filter" => {
                    // Absorbs every following token up to the next command
                    let mut tokens = Vec::new();
                    i += 1;
                    while i < parts.len() && parts[i] != "filter" {
                        tokens.push(parts[i]);
                        i += 1;
                    }
                    filter_raw = tokens.join(" ");
                }
                _ => i += 1,
            }
        }

        let int_passcode: i32 = pass_str.trim().parse().unwrap_or(0);
        let verified = passcode(&callsign) == int_passcode;

        {
            let mut ident = match self.ident.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            ident.callsign = callsign.clone();
            ident.software = software;
            ident.version = version;
            ident.filter = if filter_raw.is_empty() {
                None
            } else {
                FilterExpr::from_str(&filter_raw).ok()
            };
            ident.filter_raw = filter_raw;
        }

        // Kick every other session on this listener using the same callsign
        let victims = self
            .ctx
            .registry
            .sessions_with_callsign(self.id, &callsign);
        for victim in victims {
            debug!(
                client = %victim.remote,
                callsign = %callsign,
                "Kicking older session with same callsign"
            );
            victim.close().await;
        }

        self.verified.store(verified, Ordering::Relaxed);
        let reply = if verified {
            debug!(client = %self.remote, callsign = %callsign, "Client logged in");
            format!("# logresp {} verified, server {}", callsign, self.ctx.server_id)
        } else {
            format!(
                "# logresp {} unverified, server {}",
                callsign, self.ctx.server_id
            )
        };
        let _ = self.send(&reply).await;
        self.logged_in.store(true, Ordering::Relaxed);
    }

    async fn handle_data(&self, line: &str) {
        if !self.is_verified() {
            let _ = self.send("# invalid login").await;
            return;
        }

        let hash = fnv1a_64(line.as_bytes());
        let now = epoch_secs();
        {
            let mut dups = match self.dups.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            dups.sweep(DUP_WINDOW_SECS, now);
            if dups.contains(hash) {
                for s in self.scopes() {
                    s.inc_received_dups();
                }
                return;
            }
            dups.record(hash, now);
        }

        // An empty destination is a parse error, so `parsed.to` is never
        // empty past this point
        let parsed = match packet::parse(line) {
            Ok(p) => p,
            Err(e) => {
                trace!(client = %self.remote, error = %e, "Unparseable packet");
                for s in self.scopes() {
                    s.inc_received_errors();
                }
                return;
            }
        };

        let callsign = self.callsign();
        let q = q_construct::rewrite(
            &parsed,
            &QContext {
                server_id: &self.ctx.server_id,
                client_callsign: &callsign,
                verified: true,
            },
        );
        if q.is_drop() {
            for s in self.scopes() {
                s.inc_received_q_drops();
            }
            return;
        }

        let rewritten = match q_construct::splice_path(line, &parsed.to, &q.path) {
            Some(r) => r,
            None => {
                for s in self.scopes() {
                    s.inc_received_errors();
                }
                return;
            }
        };
        let republished = match packet::parse(&rewritten) {
            Ok(p) => p,
            Err(_) => {
                for s in self.scopes() {
                    s.inc_received_errors();
                }
                return;
            }
        };

        trace!(callsign = %callsign, packet = %republished.raw, "APRS data");
        self.ctx.stream.publish(Arc::new(republished), &callsign);
        for s in self.scopes() {
            s.inc_received_packets();
        }
    }

    async fn run_subscriber(self: Arc<Self>, mut subscription: crate::stream::Subscription) {
        loop {
            let event = tokio::select! {
                _ = self.cancel.cancelled() => break,
                ev = subscription.recv() => match ev {
                    Some(ev) => ev,
                    None => break,
                },
            };

            if !self.is_logged_in() {
                continue;
            }

            let deliver;
            {
                let ident = self.ident_read();
                // Never echo a client's own packets back to it
                if ident.callsign == event.writer.as_ref() {
                    continue;
                }
                deliver = match self.ctx.mode {
                    ListenerMode::Fullfeed => true,
                    ListenerMode::Igate => {
                        if let Some(filter) = &self.ctx.listener_filter {
                            filter.matches(&event.packet)
                        } else if let Some(filter) = &ident.filter {
                            filter.matches(&event.packet)
                        } else {
                            false
                        }
                    }
                };
            }

            if deliver && self.send(&event.packet.raw).await.is_ok() {
                for s in self.scopes() {
                    s.inc_sent_packets();
                }
            }
        }
    }

    async fn run_heartbeat(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if self.idle_secs() < HEARTBEAT_IDLE_SECS {
                continue;
            }

            let beat = format!(
                "# {}-{} {} {} {}",
                PRODUCT_NAME,
                CODENAME,
                VERSION,
                Utc::now().format("%a, %d %b %Y %H:%M:%S GMT"),
                self.ctx.server_id
            );

            let mut sent = false;
            for attempt in 0..HEARTBEAT_ATTEMPTS {
                if self.send(&beat).await.is_ok() {
                    sent = true;
                    break;
                }
                if attempt + 1 < HEARTBEAT_ATTEMPTS {
                    tokio::time::sleep(HEARTBEAT_BACKOFF).await;
                }
            }
            if !sent {
                debug!(client = %self.remote, "Heartbeat failed, closing session");
                self.close().await;
                break;
            }
        }
    }
}
