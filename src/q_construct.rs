//! q-construct handling for packets entering via client ports.
//!
//! Applies the APRS-IS q algorithm: packets carrying a valid foreign
//! construct pass through unchanged, packets without one get the construct
//! describing how they entered, and anything that would loop back through
//! this server is refused.

use crate::packet::ParsedPacket;

/// How the packet entered this server.
#[derive(Debug, Clone, Copy)]
pub struct QContext<'a> {
    pub server_id: &'a str,
    pub client_callsign: &'a str,
    pub verified: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Forward with `QResult::path`
    Pass,
    /// Invalid or non-forwardable construct
    Drop,
    /// The packet has already passed through this server
    Loop,
}

#[derive(Debug, Clone)]
pub struct QResult {
    pub path: Vec<String>,
    pub disposition: Disposition,
}

impl QResult {
    fn refuse(disposition: Disposition) -> Self {
        Self {
            path: Vec::new(),
            disposition,
        }
    }

    pub fn is_drop(&self) -> bool {
        self.disposition != Disposition::Pass
    }
}

/// Position of the first q construct in a path, if any. Digipeater calls are
/// uppercase on the air, so a leading lowercase `q` can only be a construct.
fn find_construct(path: &[String]) -> Option<usize> {
    path.iter().position(|hop| hop.starts_with('q'))
}

fn is_valid_construct(hop: &str) -> bool {
    let b = hop.as_bytes();
    b.len() == 3 && b[0] == b'q' && b[1] == b'A' && b[2].is_ascii_alphabetic()
}

/// Apply the q algorithm to a packet received from a client connection.
pub fn rewrite(packet: &ParsedPacket, ctx: &QContext<'_>) -> QResult {
    // A packet whose source is this server has been here before
    if packet.from == ctx.server_id {
        return QResult::refuse(Disposition::Loop);
    }

    if let Some(idx) = find_construct(&packet.path) {
        let construct = &packet.path[idx];
        if !is_valid_construct(construct) {
            return QResult::refuse(Disposition::Drop);
        }
        // qAZ marks a packet that must not be forwarded
        if construct == "qAZ" {
            return QResult::refuse(Disposition::Drop);
        }
        // Our own id after the construct means the packet looped
        if packet.path[idx + 1..]
            .iter()
            .any(|hop| hop.trim_end_matches('*') == ctx.server_id)
        {
            return QResult::refuse(Disposition::Loop);
        }
        // Valid foreign construct: pass through untouched
        return QResult {
            path: packet.path.clone(),
            disposition: Disposition::Pass,
        };
    }

    // No construct yet: stamp how the packet entered
    let mut path = packet.path.clone();
    if !ctx.verified {
        path.push("qAX".to_string());
        path.push(ctx.server_id.to_string());
    } else if packet.from == ctx.client_callsign {
        path.push("qAC".to_string());
        path.push(ctx.server_id.to_string());
    } else {
        // Gated from RF by the logged-in client
        path.push("qAR".to_string());
        path.push(ctx.client_callsign.to_string());
    }

    QResult {
        path,
        disposition: Disposition::Pass,
    }
}

/// Rebuild the header section of a raw line: everything between the first
/// `>` and the first `:` becomes `to,path...`. Pure textual splice; returns
/// `None` when the line has no such section.
pub fn splice_path(raw: &str, to: &str, path: &[String]) -> Option<String> {
    let gt = raw.find('>')?;
    let colon = raw.find(':')?;
    if colon <= gt {
        return None;
    }

    let mut header = String::from(to);
    for hop in path {
        header.push(',');
        header.push_str(hop);
    }

    Some(format!("{}>{}{}", &raw[..gt], header, &raw[colon..]))
}
