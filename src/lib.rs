//! aprshub - APRS-IS tier-2 server
//!
//! A line-oriented TCP service that authenticates amateur-radio clients by
//! callsign and passcode, deduplicates and q-construct-rewrites their
//! packets, fans traffic out to every other connected client (optionally
//! filtered), and bridges the whole feed to an upstream APRS-IS server.

pub mod config;
pub mod dup_cache;
pub mod filters;
pub mod history;
pub mod listener;
pub mod packet;
pub mod passcode;
pub mod q_construct;
pub mod session;
pub mod stats;
pub mod status;
pub mod stream;
pub mod supervisor;
pub mod uplink;

pub use config::{Config, ListenerMode};
pub use packet::ParsedPacket;
pub use stream::{DataStream, StreamData};
pub use supervisor::Supervisor;

/// Product name used in the banner and heartbeat lines.
pub const PRODUCT_NAME: &str = "aprshub";
/// Release codename, banner suffix.
pub const CODENAME: &str = "thermal";
/// Crate version as built.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
