//! Outbound APRS-IS client session to a parent server.
//!
//! Peers are tried in config order and the loop falls through to the next
//! one on any failure, forever, until told to stop. While connected the
//! uplink bridges both directions of the stream: local traffic (anything
//! not written by the uplink itself) is forwarded upstream, and upstream
//! packets are deduped, parsed best-effort and published with the reserved
//! `uplink` writer tag.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::config::UplinkPeer;
use crate::dup_cache::{DupCache, epoch_secs, fnv1a_64};
use crate::packet::{self, ParsedPacket};
use crate::stats::Stats;
use crate::status::UplinkStatus;
use crate::stream::{DataStream, UPLINK_WRITER};
use crate::{CODENAME, PRODUCT_NAME, VERSION};

/// Upstream duplicate suppression window.
pub const UPLINK_DUP_WINDOW_SECS: u64 = 1;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Pause after every peer has refused before sweeping the list again.
const RETRY_PAUSE: Duration = Duration::from_secs(5);

pub struct Uplink {
    peers: Vec<UplinkPeer>,
    server_id: String,
    passcode: i32,
    stream: Arc<DataStream>,
    stats: Arc<Stats>,
    global_stats: Arc<Stats>,
    dups: std::sync::Mutex<DupCache>,
    cancel: CancellationToken,
    connected_peer: std::sync::RwLock<Option<String>>,
    connected_at: AtomicU64,
    last_received: AtomicU64,
}

impl Uplink {
    pub fn new(
        peers: Vec<UplinkPeer>,
        server_id: String,
        passcode: i32,
        stream: Arc<DataStream>,
        global_stats: Arc<Stats>,
    ) -> Arc<Self> {
        Arc::new(Self {
            peers,
            server_id,
            passcode,
            stream,
            stats: Arc::new(Stats::new()),
            global_stats,
            dups: std::sync::Mutex::new(DupCache::new()),
            cancel: CancellationToken::new(),
            connected_peer: std::sync::RwLock::new(None),
            connected_at: AtomicU64::new(0),
            last_received: AtomicU64::new(0),
        })
    }

    /// Ask the loop to stop. The current peer session unwinds; the loop
    /// checks the flag before every connect attempt, so no new session can
    /// start after this.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn snapshot(&self) -> UplinkStatus {
        let peer = match self.connected_peer.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        let connected_at = self.connected_at.load(Ordering::Relaxed);
        let last_received = self.last_received.load(Ordering::Relaxed);

        UplinkStatus {
            connected: peer.is_some(),
            peer,
            connected_at: (connected_at > 0)
                .then(|| DateTime::<Utc>::from_timestamp(connected_at as i64, 0))
                .flatten(),
            last_received: (last_received > 0)
                .then(|| DateTime::<Utc>::from_timestamp(last_received as i64, 0))
                .flatten(),
            stats: self.stats.snapshot(),
        }
    }

    /// Connect loop: every peer in order, forever, until stopped.
    pub async fn run(self: Arc<Self>) {
        if self.peers.is_empty() {
            info!("No uplinks configured");
            return;
        }

        loop {
            for peer in &self.peers {
                if self.cancel.is_cancelled() {
                    return;
                }
                match self.session(peer).await {
                    Ok(()) => info!(peer = %peer.name, "Uplink session ended"),
                    Err(e) => {
                        debug!(peer = %peer.name, addr = %peer.addr(), error = %e, "Uplink connect failed")
                    }
                }
                self.set_disconnected();
            }
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = sleep(RETRY_PAUSE) => {}
            }
        }
    }

    async fn session(&self, peer: &UplinkPeer) -> Result<()> {
        let socket = timeout(CONNECT_TIMEOUT, TcpStream::connect(peer.addr()))
            .await
            .map_err(|_| anyhow!("connect timeout"))??;
        info!(peer = %peer.name, addr = %peer.addr(), "Uplink connected");
        metrics::counter!("uplink.connection.established_total").increment(1);

        let (read_half, mut write_half) = socket.into_split();

        let login = format!(
            "user {} pass {} vers {}-{} {}\r\n",
            self.server_id, self.passcode, PRODUCT_NAME, CODENAME, VERSION
        );
        write_half.write_all(login.as_bytes()).await?;

        self.set_connected(peer);

        // Forward local traffic upstream until the peer goes away
        let mut subscription = self.stream.subscribe();
        let stats = self.stats.clone();
        let global_stats = self.global_stats.clone();
        let cancel = self.cancel.clone();
        let sender = tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    ev = subscription.recv() => match ev {
                        Some(ev) => ev,
                        None => break,
                    },
                };
                if event.writer.as_ref() == UPLINK_WRITER {
                    continue;
                }

                if write_half.write_all(event.packet.raw.as_bytes()).await.is_err() {
                    break;
                }
                if write_half.write_all(b"\n").await.is_err() {
                    break;
                }
                let n = event.packet.raw.len() as u64 + 1;
                for s in [stats.as_ref(), global_stats.as_ref()] {
                    s.inc_sent_packets();
                    s.add_sent_bytes(n);
                }
            }
        });

        let mut reader = BufReader::new(read_half);
        let mut line = String::new();
        loop {
            line.clear();
            let read = tokio::select! {
                _ = self.cancel.cancelled() => break,
                r = reader.read_line(&mut line) => r,
            };

            match read {
                Ok(0) => {
                    debug!(peer = %peer.name, "Uplink closed by peer");
                    break;
                }
                Ok(n) => {
                    for s in [self.stats.as_ref(), self.global_stats.as_ref()] {
                        s.add_received_bytes(n as u64);
                    }
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    if trimmed.starts_with('#') {
                        trace!(peer = %peer.name, message = %trimmed, "Uplink server message");
                        continue;
                    }
                    self.ingest(trimmed);
                }
                Err(e) => {
                    debug!(peer = %peer.name, error = %e, "Uplink read error");
                    break;
                }
            }
        }

        sender.abort();
        Ok(())
    }

    /// One upstream data line: dedupe at a 1 s window, parse best-effort,
    /// publish tagged as the uplink.
    fn ingest(&self, line: &str) {
        let hash = fnv1a_64(line.as_bytes());
        let now = epoch_secs();
        {
            let mut dups = match self.dups.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            dups.sweep(UPLINK_DUP_WINDOW_SECS, now);
            if dups.contains(hash) {
                for s in [self.stats.as_ref(), self.global_stats.as_ref()] {
                    s.inc_received_dups();
                }
                return;
            }
            dups.record(hash, now);
        }

        let parsed = packet::parse(line).unwrap_or_else(|_| ParsedPacket::raw_only(line));
        self.stream.publish(Arc::new(parsed), UPLINK_WRITER);

        self.last_received.store(now, Ordering::Relaxed);
        for s in [self.stats.as_ref(), self.global_stats.as_ref()] {
            s.inc_received_packets();
        }
    }

    fn set_connected(&self, peer: &UplinkPeer) {
        match self.connected_peer.write() {
            Ok(mut guard) => *guard = Some(peer.name.clone()),
            Err(poisoned) => *poisoned.into_inner() = Some(peer.name.clone()),
        }
        self.connected_at.store(epoch_secs(), Ordering::Relaxed);
    }

    fn set_disconnected(&self) {
        match self.connected_peer.write() {
            Ok(mut guard) => *guard = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
        self.connected_at.store(0, Ordering::Relaxed);
    }
}
