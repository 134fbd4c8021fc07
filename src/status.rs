//! Read-only snapshots exposed to the HTTP status collaborator.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::ListenerMode;
use crate::stats::StatsSnapshot;

#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub id: u64,
    pub listener: String,
    pub callsign: String,
    pub addr: String,
    pub verified: bool,
    pub logged_in: bool,
    pub connected_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub software: String,
    pub version: String,
    pub filter: String,
    pub stats: StatsSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListenerStatus {
    pub name: String,
    pub mode: ListenerMode,
    pub addr: String,
    pub filter: String,
    pub online: usize,
    pub peak: usize,
    pub stats: StatsSnapshot,
    pub sessions: Vec<SessionStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UplinkStatus {
    pub connected: bool,
    pub peer: Option<String>,
    pub connected_at: Option<DateTime<Utc>>,
    pub last_received: Option<DateTime<Utc>>,
    pub stats: StatsSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    pub id: String,
    pub product: String,
    pub version: String,
    pub codename: String,
    pub started_at: DateTime<Utc>,
    pub stats: StatsSnapshot,
    pub listeners: Vec<ListenerStatus>,
    pub uplink: Option<UplinkStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_to_json() {
        let status = ServerStatus {
            id: "T2TEST".to_string(),
            product: crate::PRODUCT_NAME.to_string(),
            version: crate::VERSION.to_string(),
            codename: crate::CODENAME.to_string(),
            started_at: Utc::now(),
            stats: StatsSnapshot::default(),
            listeners: vec![ListenerStatus {
                name: "feed".to_string(),
                mode: ListenerMode::Fullfeed,
                addr: "0.0.0.0:10152".to_string(),
                filter: String::new(),
                online: 1,
                peak: 3,
                stats: StatsSnapshot::default(),
                sessions: Vec::new(),
            }],
            uplink: None,
        };

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["id"], "T2TEST");
        assert_eq!(json["listeners"][0]["mode"], "fullfeed");
        assert_eq!(json["listeners"][0]["peak"], 3);
        assert!(json["uplink"].is_null());
    }
}
