//! Time-series boundary for rate history.
//!
//! The server only records points and expires old ones; where they end up
//! (memory, disk, a real TSDB) is the collaborator's concern, so the core
//! talks to a trait object.

use std::collections::HashMap;
use std::sync::RwLock;

pub trait HistoryStore: Send + Sync {
    /// Append one `(timestamp, value)` point to the named series.
    fn record_data_point(&self, key: &str, ts: f64, value: f64);

    /// Drop every point older than `ttl_secs` relative to the newest point.
    fn clear_data_slice(&self, key: &str, ttl_secs: f64);

    /// Current points of a series, in record order.
    fn data_slice(&self, key: &str) -> Vec<(f64, f64)>;
}

/// Default in-process store.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    series: RwLock<HashMap<String, Vec<(f64, f64)>>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryStore for MemoryHistory {
    fn record_data_point(&self, key: &str, ts: f64, value: f64) {
        let mut series = match self.series.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        series.entry(key.to_string()).or_default().push((ts, value));
    }

    fn clear_data_slice(&self, key: &str, ttl_secs: f64) {
        let mut series = match self.series.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(points) = series.get_mut(key) {
            let Some(&(newest, _)) = points.last() else {
                return;
            };
            points.retain(|&(ts, _)| ts + ttl_secs > newest);
        }
    }

    fn data_slice(&self, key: &str) -> Vec<(f64, f64)> {
        let series = match self.series.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        series.get(key).cloned().unwrap_or_default()
    }
}
