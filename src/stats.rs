//! Per-entity traffic counters and 1 Hz rate sampling.
//!
//! Counters are plain atomics written by the owning entity's tasks. The
//! sampler is the only reader that mutates the prior window, so one
//! `sample()` caller per scope keeps the rates race-free.

use serde::Serialize;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Stats {
    sent_packets: AtomicU64,
    received_packets: AtomicU64,
    received_dups: AtomicU64,
    received_errors: AtomicU64,
    received_q_drops: AtomicU64,
    sent_bytes: AtomicU64,
    received_bytes: AtomicU64,

    send_packet_rate: AtomicU64,
    recv_packet_rate: AtomicU64,
    send_byte_rate: AtomicU64,
    recv_byte_rate: AtomicU64,

    prior: Mutex<PriorWindow>,
}

#[derive(Debug, Default)]
struct PriorWindow {
    sent_packets: u64,
    received_packets: u64,
    sent_bytes: u64,
    received_bytes: u64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_sent_packets(&self) {
        self.sent_packets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_received_packets(&self) {
        self.received_packets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_received_dups(&self) {
        self.received_dups.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_received_errors(&self) {
        self.received_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_received_q_drops(&self) {
        self.received_q_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_sent_bytes(&self, n: u64) {
        self.sent_bytes.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_received_bytes(&self, n: u64) {
        self.received_bytes.fetch_add(n, Ordering::Relaxed);
    }

    pub fn received_packets(&self) -> u64 {
        self.received_packets.load(Ordering::Relaxed)
    }

    pub fn received_dups(&self) -> u64 {
        self.received_dups.load(Ordering::Relaxed)
    }

    pub fn received_errors(&self) -> u64 {
        self.received_errors.load(Ordering::Relaxed)
    }

    pub fn received_q_drops(&self) -> u64 {
        self.received_q_drops.load(Ordering::Relaxed)
    }

    pub fn sent_packets(&self) -> u64 {
        self.sent_packets.load(Ordering::Relaxed)
    }

    pub fn send_packet_rate(&self) -> u64 {
        self.send_packet_rate.load(Ordering::Relaxed)
    }

    pub fn recv_packet_rate(&self) -> u64 {
        self.recv_packet_rate.load(Ordering::Relaxed)
    }

    /// Compute the per-second deltas since the previous call and roll the
    /// prior window forward. One caller per scope.
    pub fn sample(&self) {
        let mut prior = match self.prior.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let sent_packets = self.sent_packets.load(Ordering::Relaxed);
        let received_packets = self.received_packets.load(Ordering::Relaxed);
        let sent_bytes = self.sent_bytes.load(Ordering::Relaxed);
        let received_bytes = self.received_bytes.load(Ordering::Relaxed);

        self.send_packet_rate
            .store(sent_packets.saturating_sub(prior.sent_packets), Ordering::Relaxed);
        self.recv_packet_rate.store(
            received_packets.saturating_sub(prior.received_packets),
            Ordering::Relaxed,
        );
        self.send_byte_rate
            .store(sent_bytes.saturating_sub(prior.sent_bytes), Ordering::Relaxed);
        self.recv_byte_rate.store(
            received_bytes.saturating_sub(prior.received_bytes),
            Ordering::Relaxed,
        );

        prior.sent_packets = sent_packets;
        prior.received_packets = received_packets;
        prior.sent_bytes = sent_bytes;
        prior.received_bytes = received_bytes;
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            sent_packets: self.sent_packets.load(Ordering::Relaxed),
            received_packets: self.received_packets.load(Ordering::Relaxed),
            received_dups: self.received_dups.load(Ordering::Relaxed),
            received_errors: self.received_errors.load(Ordering::Relaxed),
            received_q_drops: self.received_q_drops.load(Ordering::Relaxed),
            sent_bytes: self.sent_bytes.load(Ordering::Relaxed),
            received_bytes: self.received_bytes.load(Ordering::Relaxed),
            send_packet_rate: self.send_packet_rate.load(Ordering::Relaxed),
            recv_packet_rate: self.recv_packet_rate.load(Ordering::Relaxed),
            send_byte_rate: self.send_byte_rate.load(Ordering::Relaxed),
            recv_byte_rate: self.recv_byte_rate.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of one scope's counters, for the status boundary.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatsSnapshot {
    pub sent_packets: u64,
    pub received_packets: u64,
    pub received_dups: u64,
    pub received_errors: u64,
    pub received_q_drops: u64,
    pub sent_bytes: u64,
    pub received_bytes: u64,
    pub send_packet_rate: u64,
    pub recv_packet_rate: u64,
    pub send_byte_rate: u64,
    pub recv_byte_rate: u64,
}
