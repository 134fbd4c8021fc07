use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// FNV-1a 64-bit hash of a raw packet line.
pub fn fnv1a_64(data: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = OFFSET_BASIS;
    for &b in data {
        hash ^= b as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// Current wall clock as epoch seconds, the timestamp unit the cache stores.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Bounded packet-hash → timestamp map used for duplicate suppression.
///
/// Each owner sweeps with its own TTL before every membership test: 30 s for
/// per-session dedupe, 1 s for the uplink's global instance.
#[derive(Debug, Default)]
pub struct DupCache {
    entries: HashMap<u64, u64>,
}

impl DupCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove every entry whose timestamp + ttl has passed.
    pub fn sweep(&mut self, ttl_secs: u64, now_secs: u64) {
        self.entries.retain(|_, &mut ts| ts + ttl_secs > now_secs);
    }

    pub fn contains(&self, hash: u64) -> bool {
        self.entries.contains_key(&hash)
    }

    pub fn record(&mut self, hash: u64, now_secs: u64) {
        self.entries.insert(hash, now_secs);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv_is_deterministic() {
        let line = b"N0CALL>APRS,TCPIP*:>test";
        assert_eq!(fnv1a_64(line), fnv1a_64(line));
        assert_ne!(fnv1a_64(line), fnv1a_64(b"N0CALL>APRS,TCPIP*:>test2"));
    }

    #[test]
    fn fnv_reference_vectors() {
        // Published FNV-1a 64 test vectors
        assert_eq!(fnv1a_64(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a_64(b"a"), 0xaf63_dc4c_8601_ec8c);
        assert_eq!(fnv1a_64(b"foobar"), 0x8594_4171_f739_67e8);
    }

    #[test]
    fn record_then_contains() {
        let mut cache = DupCache::new();
        let hash = fnv1a_64(b"some line");
        assert!(!cache.contains(hash));
        cache.record(hash, 100);
        assert!(cache.contains(hash));
    }

    #[test]
    fn sweep_removes_expired() {
        let mut cache = DupCache::new();
        cache.record(1, 100);
        cache.record(2, 120);

        cache.sweep(30, 129);
        assert!(cache.contains(1));
        assert!(cache.contains(2));

        cache.sweep(30, 130);
        assert!(!cache.contains(1));
        assert!(cache.contains(2));

        cache.sweep(30, 150);
        assert!(cache.is_empty());
    }

    #[test]
    fn one_second_window() {
        let mut cache = DupCache::new();
        cache.record(7, 100);
        cache.sweep(1, 100);
        assert!(cache.contains(7));
        cache.sweep(1, 101);
        assert!(!cache.contains(7));
    }
}
