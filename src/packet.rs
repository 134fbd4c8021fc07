//! TNC-2 packet parsing: `SRC>DEST[,PATH]:payload`.
//!
//! Only the views the routing core and filter engine consume are decoded.
//! A well-formed header with an undecodable payload is not an error; the
//! payload fields simply stay empty.

use serde::Serialize;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PacketFormat {
    Position,
    Object,
    Item,
    Message,
    Query,
    Status,
    Telemetry,
    Weather,
    MicE,
    #[default]
    Unknown,
}

impl Display for PacketFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PacketFormat::Position => "position",
            PacketFormat::Object => "object",
            PacketFormat::Item => "item",
            PacketFormat::Message => "message",
            PacketFormat::Query => "query",
            PacketFormat::Status => "status",
            PacketFormat::Telemetry => "telemetry",
            PacketFormat::Weather => "weather",
            PacketFormat::MicE => "mice",
            PacketFormat::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// Structured view of one APRS-IS line.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ParsedPacket {
    pub from: String,
    pub to: String,
    pub path: Vec<String>,
    pub raw: String,
    pub format: PacketFormat,
    /// Decimal degrees; 0.0 when the packet carries no decodable position.
    pub lat: f64,
    pub lon: f64,
    /// Two characters, table then code; empty when absent.
    pub symbol: String,
    pub object_name: String,
    pub message_text: String,
    pub status: String,
    pub weather: Vec<(char, String)>,
    pub addressee: String,
    pub comment: String,
}

impl ParsedPacket {
    /// Fallback for lines that fail structured parsing but must still flow
    /// through the stream (uplink ingest tolerates parse errors).
    pub fn raw_only(line: &str) -> Self {
        Self {
            raw: line.to_string(),
            ..Self::default()
        }
    }

    pub fn has_position(&self) -> bool {
        self.lat != 0.0 || self.lon != 0.0
    }
}

#[derive(Debug)]
pub struct PacketError {
    pub message: String,
}

impl PacketError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Display for PacketError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for PacketError {}

/// Parse one line in TNC-2 format.
pub fn parse(line: &str) -> Result<ParsedPacket, PacketError> {
    let line = line.trim();

    let colon = line
        .find(':')
        .ok_or_else(|| PacketError::new("missing payload separator"))?;
    let header = &line[..colon];
    let payload = &line[colon + 1..];

    let gt = header
        .find('>')
        .ok_or_else(|| PacketError::new("missing destination separator"))?;
    let from = &header[..gt];
    if from.is_empty() {
        return Err(PacketError::new("empty source callsign"));
    }

    let mut hops = header[gt + 1..].split(',');
    let to = hops.next().unwrap_or("");
    if to.is_empty() {
        return Err(PacketError::new("empty destination callsign"));
    }
    let path: Vec<String> = hops
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .collect();

    let mut packet = ParsedPacket {
        from: from.to_string(),
        to: to.to_string(),
        path,
        raw: line.to_string(),
        ..ParsedPacket::default()
    };
    classify_payload(&mut packet, payload);
    Ok(packet)
}

fn classify_payload(packet: &mut ParsedPacket, payload: &str) {
    let bytes = payload.as_bytes();
    let Some(&first) = bytes.first() else {
        return;
    };

    match first {
        b':' => parse_message(packet, payload),
        b'!' | b'=' => {
            packet.format = PacketFormat::Position;
            parse_position(packet, &payload[1..]);
        }
        b'/' | b'@' => {
            // Timestamped position: 7-character timestamp after the type char
            if payload.len() >= 8 && payload.is_char_boundary(8) {
                packet.format = PacketFormat::Position;
                parse_position(packet, &payload[8..]);
            }
        }
        b';' => parse_object(packet, payload),
        b')' => parse_item(packet, payload),
        b'>' => {
            packet.format = PacketFormat::Status;
            packet.status = payload[1..].trim().to_string();
        }
        b'?' => packet.format = PacketFormat::Query,
        b'_' => {
            packet.format = PacketFormat::Weather;
            parse_weather(packet, &payload[1..]);
        }
        b'T' if payload.starts_with("T#") => packet.format = PacketFormat::Telemetry,
        b'`' | b'\'' => packet.format = PacketFormat::MicE,
        _ => {}
    }
}

fn parse_message(packet: &mut ParsedPacket, payload: &str) {
    // :ADDRESSEE:text — addressee field is exactly nine characters
    if payload.len() < 11 || payload.as_bytes()[10] != b':' {
        return;
    }
    packet.addressee = payload[1..10].trim().to_string();
    packet.message_text = payload[11..].to_string();
    packet.format = PacketFormat::Message;

    // Telemetry parameter definitions travel as messages
    const TELEMETRY_PREFIXES: [&str; 4] = ["PARM.", "UNIT.", "EQNS.", "BITS."];
    if TELEMETRY_PREFIXES
        .iter()
        .any(|p| packet.message_text.starts_with(p))
    {
        packet.format = PacketFormat::Telemetry;
    }
}

fn parse_object(packet: &mut ParsedPacket, payload: &str) {
    // ;NAME_____*DDHHMMz<position>  — 9-char name, live/killed flag, timestamp
    if payload.len() < 18 || !payload.as_bytes()[..18].is_ascii() {
        return;
    }
    packet.object_name = payload[1..10].trim().to_string();
    packet.format = PacketFormat::Object;
    parse_position(packet, &payload[18..]);
}

fn parse_item(packet: &mut ParsedPacket, payload: &str) {
    // )NAME!<position> or )NAME_<position> — 3 to 9 character name
    let rest = &payload[1..];
    let Some(idx) = rest.find(['!', '_']) else {
        return;
    };
    if !(3..=9).contains(&idx) {
        return;
    }
    packet.object_name = rest[..idx].trim().to_string();
    packet.format = PacketFormat::Item;
    parse_position(packet, &rest[idx + 1..]);
}

/// Uncompressed position: `DDMM.mmN<table>DDDMM.mmE<code>`, comment after.
fn parse_position(packet: &mut ParsedPacket, s: &str) {
    let bytes = s.as_bytes();
    if bytes.len() < 19 || !bytes[..19].is_ascii() {
        return;
    }

    let Some(lat) = parse_lat(&s[0..8]) else {
        return;
    };
    let Some(lon) = parse_lon(&s[9..18]) else {
        return;
    };

    packet.lat = lat;
    packet.lon = lon;
    packet.symbol = format!("{}{}", bytes[8] as char, bytes[18] as char);
    packet.comment = s[19..].trim().to_string();

    // Weather stations report as a position with the '_' symbol code
    if bytes[18] == b'_' {
        let comment = packet.comment.clone();
        parse_weather(packet, &comment);
    }
}

fn parse_lat(s: &str) -> Option<f64> {
    if s.len() != 8 {
        return None;
    }
    let deg: f64 = s[0..2].parse().ok()?;
    let min: f64 = s[2..7].parse().ok()?;
    let value = deg + min / 60.0;
    match &s[7..8] {
        "N" => Some(value),
        "S" => Some(-value),
        _ => None,
    }
}

fn parse_lon(s: &str) -> Option<f64> {
    if s.len() != 9 {
        return None;
    }
    let deg: f64 = s[0..3].parse().ok()?;
    let min: f64 = s[3..8].parse().ok()?;
    let value = deg + min / 60.0;
    match &s[8..9] {
        "E" => Some(value),
        "W" => Some(-value),
        _ => None,
    }
}

/// Collect letter/value pairs from a weather data block.
fn parse_weather(packet: &mut ParsedPacket, s: &str) {
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if !c.is_ascii_alphabetic() {
            continue;
        }
        let mut value = String::new();
        while let Some(&d) = chars.peek() {
            if d.is_ascii_digit() || d == '.' || d == '-' {
                value.push(d);
                chars.next();
            } else {
                break;
            }
        }
        if !value.is_empty() {
            packet.weather.push((c, value));
        }
    }
}
