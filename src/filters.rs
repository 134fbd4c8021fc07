//! APRS-IS server-side filter expressions: parsing and packet matching.
//!
//! A filter is whitespace-separated tokens; `-` prefixes a negation. A packet
//! passes when at least one positive token matches and no negation does.
//! Empty and `default` filters pass nothing.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::packet::{PacketFormat, ParsedPacket};

#[derive(Debug, Clone, PartialEq)]
pub struct FilterExpr {
    pub terms: Vec<FilterItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterItem {
    pub negated: bool,
    pub kind: FilterKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterKind {
    /// r/<lat>/<lon>/<range_km>
    Range { lat: f64, lon: f64, km: f64 },

    /// a/<latN>/<lonW>/<latS>/<lonE> (bounding box)
    Area {
        lat_n: f64,
        lon_w: f64,
        lat_s: f64,
        lon_e: f64,
    },

    /// p/<prefix1>/<prefix2>/... (source callsign prefixes)
    Prefixes(Vec<String>),

    /// b/<call1>/<call2>/... (source callsigns, wildcards allowed)
    Buddies(Vec<String>),

    /// o/<obj1>/... and os/<obj1>/... (object/item names; `|`→`/`, `~`→`*`)
    Objects(Vec<String>),

    /// t/<flags> (packet type letters: poimqstuwn)
    TypeSet(String),

    /// s/<pri>/<alt>/<overlay> (symbol membership)
    Symbol {
        primary: String,
        alternate: String,
        overlay: String,
    },

    /// d/<digi1>/... (any path element, wildcards allowed)
    Digipeaters(Vec<String>),

    /// e/<call1>/... (first path element, the receiving IGate)
    Entry(Vec<String>),

    /// g/<call1>/... (message addressee)
    Groups(Vec<String>),

    /// u/<dest1>/... (destination callsign)
    Unproto(Vec<String>),

    /// q/<con>/[I] (q-construct presence in the raw line)
    QConstruct { construct: String, igate: bool },

    /// m/<km> — needs the client's own position, which the engine does not
    /// track; parsed but never matches
    MyRangeKm(f64),

    /// f/<call>/<km> — needs a tracked friend position; parsed, never matches
    FriendRange { call: String, km: f64 },

    /// Unrecognized token preserved as-is; never matches
    Unknown(String),

    /// A token that failed structured parsing; original preserved, never matches
    Invalid { original: String, reason: String },
}

#[derive(Debug)]
pub struct ParseFilterError {
    pub message: String,
}

impl Display for ParseFilterError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}
impl std::error::Error for ParseFilterError {}

impl FromStr for FilterExpr {
    type Err = ParseFilterError;

    /// Parse a full filter string like:
    ///   "r/54.19/80.23/150 p/DL/OE -t/n b/OGN*/FLR* a/49.16/13.94/48.99/14.20"
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut terms = Vec::new();

        for raw in s.split_whitespace() {
            let (negated, token) = if let Some(stripped) = raw.strip_prefix('-') {
                (true, stripped)
            } else {
                (false, raw)
            };

            let kind = parse_single_token(token).unwrap_or_else(|e| FilterKind::Invalid {
                original: token.to_string(),
                reason: e,
            });

            terms.push(FilterItem { negated, kind });
        }

        Ok(FilterExpr { terms })
    }
}

impl FilterExpr {
    /// True when at least one positive term matches and no negated term does.
    /// An expression with no positive terms passes nothing.
    pub fn matches(&self, packet: &ParsedPacket) -> bool {
        let positive = self
            .terms
            .iter()
            .filter(|t| !t.negated)
            .any(|t| term_matches(&t.kind, packet));
        if !positive {
            return false;
        }

        !self
            .terms
            .iter()
            .filter(|t| t.negated)
            .any(|t| term_matches(&t.kind, packet))
    }
}

/// Stateless evaluation of a filter string against a packet. Empty and
/// `default` filters pass nothing.
pub fn matches(filter: &str, packet: &ParsedPacket) -> bool {
    let filter = filter.trim();
    if filter.is_empty() || filter == "default" {
        return false;
    }
    match FilterExpr::from_str(filter) {
        Ok(expr) => expr.matches(packet),
        Err(_) => false,
    }
}

impl Display for FilterExpr {
    /// Serialize back to an APRS filter string (keeps order and negation).
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::with_capacity(self.terms.len());
        for t in &self.terms {
            let s = match &t.kind {
                FilterKind::Range { lat, lon, km } => format!(
                    "r/{}/{}/{}",
                    fmt_float(*lat),
                    fmt_float(*lon),
                    fmt_float(*km)
                ),
                FilterKind::Area {
                    lat_n,
                    lon_w,
                    lat_s,
                    lon_e,
                } => format!(
                    "a/{}/{}/{}/{}",
                    fmt_float(*lat_n),
                    fmt_float(*lon_w),
                    fmt_float(*lat_s),
                    fmt_float(*lon_e)
                ),
                FilterKind::Prefixes(list) => format!("p/{}", list.join("/")),
                FilterKind::Buddies(list) => format!("b/{}", list.join("/")),
                FilterKind::Objects(list) => format!("o/{}", list.join("/")),
                FilterKind::TypeSet(flags) => format!("t/{}", flags),
                FilterKind::Symbol {
                    primary,
                    alternate,
                    overlay,
                } => {
                    if overlay.is_empty() {
                        format!("s/{}/{}", primary, alternate)
                    } else {
                        format!("s/{}/{}/{}", primary, alternate, overlay)
                    }
                }
                FilterKind::Digipeaters(list) => format!("d/{}", list.join("/")),
                FilterKind::Entry(list) => format!("e/{}", list.join("/")),
                FilterKind::Groups(list) => format!("g/{}", list.join("/")),
                FilterKind::Unproto(list) => format!("u/{}", list.join("/")),
                FilterKind::QConstruct { construct, igate } => {
                    if *igate {
                        format!("q/{}/I", construct)
                    } else {
                        format!("q/{}", construct)
                    }
                }
                FilterKind::MyRangeKm(km) => format!("m/{}", fmt_float(*km)),
                FilterKind::FriendRange { call, km } => {
                    format!("f/{}/{}", call, fmt_float(*km))
                }
                FilterKind::Unknown(s) => s.clone(),
                FilterKind::Invalid { original, .. } => original.clone(),
            };
            parts.push(if t.negated { format!("-{}", s) } else { s });
        }
        write!(f, "{}", parts.join(" "))
    }
}

// ---------------------------- matching ----------------------------

fn term_matches(kind: &FilterKind, packet: &ParsedPacket) -> bool {
    match kind {
        FilterKind::Range { lat, lon, km } => {
            packet.has_position()
                && haversine_km(*lat, *lon, packet.lat, packet.lon) <= *km
        }
        FilterKind::Area {
            lat_n,
            lon_w,
            lat_s,
            lon_e,
        } => {
            packet.has_position()
                && packet.lat <= *lat_n
                && packet.lat >= *lat_s
                && packet.lon >= *lon_w
                && packet.lon <= *lon_e
        }
        FilterKind::Prefixes(prefixes) => {
            prefixes.iter().any(|p| packet.from.starts_with(p.as_str()))
        }
        FilterKind::Buddies(calls) => {
            calls.iter().any(|c| wildcard_match(c, &packet.from))
        }
        FilterKind::Objects(names) => {
            !packet.object_name.is_empty()
                && names.iter().any(|n| {
                    let pattern = n.replace('|', "/").replace('~', "*");
                    wildcard_match(&pattern, &packet.object_name)
                })
        }
        FilterKind::TypeSet(flags) => flags.chars().any(|c| type_flag_matches(c, packet)),
        FilterKind::Symbol {
            primary,
            alternate,
            overlay,
        } => symbol_matches(primary, alternate, overlay, packet),
        FilterKind::Digipeaters(digis) => digis
            .iter()
            .any(|d| packet.path.iter().any(|hop| wildcard_match(d, hop))),
        FilterKind::Entry(calls) => match packet.path.first() {
            Some(first) => calls.iter().any(|c| wildcard_match(c, first)),
            None => false,
        },
        FilterKind::Groups(calls) => {
            !packet.addressee.is_empty()
                && calls.iter().any(|c| wildcard_match(c, &packet.addressee))
        }
        FilterKind::Unproto(dests) => dests.iter().any(|d| wildcard_match(d, &packet.to)),
        FilterKind::QConstruct { construct, igate } => {
            if !construct.is_empty() && packet.raw.contains(&format!("q{}", construct)) {
                return true;
            }
            *igate
                && (packet.raw.contains("qAr")
                    || packet.raw.contains("qAo")
                    || packet.raw.contains("qAR"))
        }
        // m/ and f/ need client-side position state the engine does not have
        FilterKind::MyRangeKm(_) | FilterKind::FriendRange { .. } => false,
        FilterKind::Unknown(_) | FilterKind::Invalid { .. } => false,
    }
}

fn type_flag_matches(flag: char, packet: &ParsedPacket) -> bool {
    match flag {
        'p' => packet.format == PacketFormat::Position,
        'o' => packet.format == PacketFormat::Object || !packet.object_name.is_empty(),
        'm' => !packet.message_text.is_empty(),
        'q' => packet.format == PacketFormat::Query,
        's' => !packet.status.is_empty(),
        't' => packet.format == PacketFormat::Telemetry,
        'w' => !packet.weather.is_empty(),
        'n' => packet.comment.contains("NWS"),
        // 'i' (items) and 'u' (user-defined) are unassigned here and never match
        _ => false,
    }
}

fn symbol_matches(primary: &str, alternate: &str, overlay: &str, packet: &ParsedPacket) -> bool {
    let mut chars = packet.symbol.chars();
    let (Some(table), Some(code)) = (chars.next(), chars.next()) else {
        return false;
    };

    if !primary.is_empty() && table == '/' && primary.contains(code) {
        return true;
    }
    if !alternate.is_empty() && table != '/' && alternate.contains(code) {
        return overlay.is_empty() || overlay.contains(table);
    }
    false
}

/// Great-circle distance between two coordinates, in kilometers.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;

    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

/// Wildcard pattern matching: `*` matches any run of characters, everything
/// else is literal. A bare `*` matches anything.
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let mut pos = 0usize;
    let first = parts[0];
    if !first.is_empty() {
        if !text.starts_with(first) {
            return false;
        }
        pos = first.len();
    }

    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        match text[pos..].find(part) {
            Some(i) => pos += i + part.len(),
            None => return false,
        }
    }

    let last = parts[parts.len() - 1];
    if last.is_empty() {
        return true;
    }
    text.len() >= pos + last.len() && text.ends_with(last)
}

// ---------------------------- parsing ----------------------------

fn parse_single_token(tok: &str) -> Result<FilterKind, String> {
    let mut parts = tok.splitn(2, '/');
    let head = parts.next().unwrap_or("");
    let tail = parts.next();

    match (head, tail) {
        ("r", Some(rest)) => parse_r(rest),
        ("a", Some(rest)) => parse_a(rest),
        ("p", Some(rest)) => Ok(FilterKind::Prefixes(split_nonempty(rest))),
        ("b", Some(rest)) => Ok(FilterKind::Buddies(split_nonempty(rest))),
        ("o", Some(rest)) | ("os", Some(rest)) => Ok(FilterKind::Objects(split_nonempty(rest))),
        ("t", Some(rest)) => Ok(FilterKind::TypeSet(rest.to_string())),
        ("s", Some(rest)) => parse_s(rest),
        ("d", Some(rest)) => Ok(FilterKind::Digipeaters(split_nonempty(rest))),
        ("e", Some(rest)) => Ok(FilterKind::Entry(split_nonempty(rest))),
        ("g", Some(rest)) => Ok(FilterKind::Groups(split_nonempty(rest))),
        ("u", Some(rest)) => Ok(FilterKind::Unproto(split_nonempty(rest))),
        ("q", Some(rest)) => parse_q(rest),
        ("m", Some(rest)) => {
            let km = parse_f64(rest).map_err(|e| format!("bad m/<km>: {}", e))?;
            Ok(FilterKind::MyRangeKm(km))
        }
        ("f", Some(rest)) => parse_f(rest),
        (tag, None) => Ok(FilterKind::Unknown(tag.to_string())),
        _ => Ok(FilterKind::Unknown(tok.to_string())),
    }
}

fn parse_r(rest: &str) -> Result<FilterKind, String> {
    let v = split_allow_empty(rest);
    if v.len() != 3 {
        return Err(format!("bad r/<lat>/<lon>/<km>: got {} parts", v.len()));
    }
    let lat = parse_f64(&v[0]).map_err(|e| format!("r/lat: {}", e))?;
    let lon = parse_f64(&v[1]).map_err(|e| format!("r/lon: {}", e))?;
    let km = parse_f64(&v[2]).map_err(|e| format!("r/km: {}", e))?;
    validate_lat_lon(lat, lon)?;
    if !km.is_finite() || km < 0.0 {
        return Err("r/km must be finite, >= 0".to_string());
    }
    Ok(FilterKind::Range { lat, lon, km })
}

fn parse_a(rest: &str) -> Result<FilterKind, String> {
    let v = split_allow_empty(rest);
    if v.len() != 4 {
        return Err(format!(
            "bad a/<latN>/<lonW>/<latS>/<lonE>: got {} parts",
            v.len()
        ));
    }
    let lat_n = parse_f64(&v[0]).map_err(|e| format!("a/latN: {}", e))?;
    let lon_w = parse_f64(&v[1]).map_err(|e| format!("a/lonW: {}", e))?;
    let lat_s = parse_f64(&v[2]).map_err(|e| format!("a/latS: {}", e))?;
    let lon_e = parse_f64(&v[3]).map_err(|e| format!("a/lonE: {}", e))?;
    validate_lat_lon(lat_n, lon_w)?;
    validate_lat_lon(lat_s, lon_e)?;
    Ok(FilterKind::Area {
        lat_n,
        lon_w,
        lat_s,
        lon_e,
    })
}

fn parse_s(rest: &str) -> Result<FilterKind, String> {
    let v = split_allow_empty(rest);
    if v.is_empty() || v.iter().all(|p| p.is_empty()) {
        return Err("s/ requires at least one symbol list".to_string());
    }
    Ok(FilterKind::Symbol {
        primary: v.first().cloned().unwrap_or_default(),
        alternate: v.get(1).cloned().unwrap_or_default(),
        overlay: v.get(2).cloned().unwrap_or_default(),
    })
}

fn parse_q(rest: &str) -> Result<FilterKind, String> {
    let v = split_allow_empty(rest);
    Ok(FilterKind::QConstruct {
        construct: v.first().cloned().unwrap_or_default(),
        igate: v.get(1).map(|p| p == "I").unwrap_or(false),
    })
}

fn parse_f(rest: &str) -> Result<FilterKind, String> {
    let v = split_allow_empty(rest);
    if v.len() != 2 {
        return Err(format!("bad f/<call>/<km>: got {} parts", v.len()));
    }
    let km = parse_f64(&v[1]).map_err(|e| format!("f/km: {}", e))?;
    Ok(FilterKind::FriendRange {
        call: v[0].clone(),
        km,
    })
}

fn split_allow_empty(s: &str) -> Vec<String> {
    s.split('/').map(|x| x.to_string()).collect()
}

fn split_nonempty(s: &str) -> Vec<String> {
    s.split('/')
        .filter(|x| !x.is_empty())
        .map(|x| x.to_string())
        .collect()
}

fn parse_f64(s: &str) -> Result<f64, String> {
    if s.is_empty() {
        return Err("missing number".to_string());
    }
    s.parse::<f64>().map_err(|_| format!("not a number: {}", s))
}

fn validate_lat_lon(lat: f64, lon: f64) -> Result<(), String> {
    if !lat.is_finite() || !lon.is_finite() {
        return Err("lat/lon must be finite".to_string());
    }
    if !(-90.0..=90.0).contains(&lat) {
        return Err(format!("lat out of range [-90,90]: {}", lat));
    }
    if !(-180.0..=180.0).contains(&lon) {
        return Err(format!("lon out of range [-180,180]: {}", lon));
    }
    Ok(())
}

fn fmt_float(x: f64) -> String {
    // Trim trailing zeros while keeping a decimal if needed
    let s = format!("{}", x);
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::parse;

    fn position_packet() -> ParsedPacket {
        parse("DL1ABC>APRS,WIDE1-1,qAR,GATE1:!4903.50N/07201.75W>on my way").unwrap()
    }

    #[test]
    fn parses_samples() {
        let s = "g/ALL r/54.1989/80.2397/150.0 -t/n b/OGN22244E/FLR* \
                 a/49.1678/13.9455/48.9972/14.2061 t/spuoimnwt lzma r///";
        let expr = FilterExpr::from_str(s).unwrap();
        assert!(!expr.terms.is_empty());

        assert!(matches!(expr.terms[0].kind, FilterKind::Groups(_)));
        assert!(matches!(expr.terms[1].kind, FilterKind::Range { .. }));
        assert!(
            expr.terms
                .iter()
                .any(|t| t.negated && matches!(t.kind, FilterKind::TypeSet(ref x) if x == "n"))
        );
        assert!(
            expr.terms
                .iter()
                .any(|t| matches!(t.kind, FilterKind::Unknown(ref x) if x == "lzma"))
        );
        assert!(
            expr.terms
                .iter()
                .any(|t| matches!(t.kind, FilterKind::Invalid { ref original, .. } if original == "r///"))
        );
    }

    #[test]
    fn round_trip() {
        let s = "-p/oimqstunw r/48.0/10.0/100 t/p e/LH* u/OGFLR/OGNT*";
        let expr = FilterExpr::from_str(s).unwrap();
        assert_eq!(expr.to_string(), "-p/oimqstunw r/48/10/100 t/p e/LH* u/OGFLR/OGNT*");
    }

    #[test]
    fn empty_and_default_match_nothing() {
        let p = position_packet();
        assert!(!matches("", &p));
        assert!(!matches("default", &p));
        assert!(!matches("   ", &p));
    }

    #[test]
    fn negation_only_matches_nothing() {
        let p = position_packet();
        assert!(!matches("-t/n", &p));
    }

    #[test]
    fn range_filter() {
        let p = position_packet();
        assert!(matches("r/49.0/-72.0/50", &p));
        assert!(!matches("r/49.0/-72.0/1", &p));
        // Zero coordinates are never in range
        let no_pos = parse("DL1ABC>APRS:>status only").unwrap();
        assert!(!matches("r/0.0/0.0/10000", &no_pos));
    }

    #[test]
    fn area_filter() {
        let p = position_packet();
        assert!(matches("a/50/-73/48/-71", &p));
        assert!(!matches("a/48/-73/47/-71", &p));
    }

    #[test]
    fn prefix_filter() {
        let p = position_packet();
        assert!(matches("p/DL", &p));
        assert!(matches("p/XX/DL1", &p));
        assert!(!matches("p/W1/K2", &p));
    }

    #[test]
    fn buddy_filter_wildcards() {
        let p = position_packet();
        assert!(matches("b/DL1ABC", &p));
        assert!(matches("b/DL1*", &p));
        assert!(matches("b/*", &p));
        assert!(!matches("b/DL2*", &p));
    }

    #[test]
    fn object_filter() {
        let p = parse("DL1ABC>APRS:;LEADER   *092345z4903.50N/07201.75W>go").unwrap();
        assert!(matches("o/LEADER", &p));
        assert!(matches("o/LEAD~", &p));
        assert!(!matches("o/CHASE", &p));
        // Packets without an object name never match
        assert!(!matches("o/*", &position_packet()));
        // os/ behaves as o/
        assert!(matches("os/LEADER", &p));
    }

    #[test]
    fn type_filter() {
        let pos = position_packet();
        assert!(matches("t/p", &pos));
        assert!(matches("t/mp", &pos));
        assert!(!matches("t/m", &pos));

        let msg = parse("DL1ABC>APRS::TARGET   :hello{1").unwrap();
        assert!(matches("t/m", &msg));

        let wx = parse("DL1ABC>APRS:_10090556c220s004g005t077").unwrap();
        assert!(matches("t/w", &wx));

        let status = parse("DL1ABC>APRS:>NWS advisory relay").unwrap();
        assert!(matches("t/s", &status));

        // 'i' and 'u' are not assigned and never match
        assert!(!matches("t/i", &pos));
        assert!(!matches("t/u", &pos));
    }

    #[test]
    fn nws_flag_checks_comment() {
        let p = parse("DL1ABC>APRS:!4903.50N/07201.75W>NWS bulletin follows").unwrap();
        assert!(matches("t/n", &p));
        assert!(!matches("t/n", &position_packet()));
    }

    #[test]
    fn symbol_filter() {
        let car = parse("DL1ABC>APRS:!4903.50N/07201.75W>cruising").unwrap();
        assert!(matches("s/>", &car));
        assert!(!matches("s/#", &car));

        let digi = parse("DL1ABC>APRS:!4903.50NN07201.75W#overlay N").unwrap();
        assert!(matches("s//#", &digi));
        assert!(matches("s//#/N", &digi));
        assert!(!matches("s//#/D", &digi));
    }

    #[test]
    fn digipeater_filter() {
        let p = position_packet();
        assert!(matches("d/WIDE1-1", &p));
        assert!(matches("d/WIDE*", &p));
        assert!(!matches("d/TRACE*", &p));
    }

    #[test]
    fn entry_filter_checks_first_hop() {
        let p = position_packet();
        assert!(matches("e/WIDE1*", &p));
        // GATE1 is in the path but not first
        assert!(!matches("e/GATE1", &p));
    }

    #[test]
    fn group_filter() {
        let msg = parse("DL1ABC>APRS::BLN1     :snow warning").unwrap();
        assert!(matches("g/BLN*", &msg));
        assert!(!matches("g/BLN*", &position_packet()));
    }

    #[test]
    fn unproto_filter() {
        let p = position_packet();
        assert!(matches("u/APRS", &p));
        assert!(matches("u/AP*", &p));
        assert!(!matches("u/OGFLR", &p));
    }

    #[test]
    fn q_construct_filter() {
        let p = position_packet();
        assert!(matches("q/AR", &p));
        assert!(!matches("q/AC", &p));
        assert!(matches("q//I", &p));
    }

    #[test]
    fn my_and_friend_range_never_match() {
        let p = position_packet();
        assert!(!matches("m/100", &p));
        assert!(!matches("f/DL1ABC/100", &p));
    }

    #[test]
    fn negation_vetoes() {
        let p = position_packet();
        assert!(matches("p/DL", &p));
        assert!(!matches("p/DL -b/DL1ABC", &p));
        assert!(matches("p/DL -b/DL9ZZZ", &p));
    }

    #[test]
    fn wildcard_matching() {
        assert!(wildcard_match("*", "anything"));
        assert!(wildcard_match("FLR*", "FLRDD1234"));
        assert!(wildcard_match("*-1", "WIDE1-1"));
        assert!(wildcard_match("A*C*E", "ABCDE"));
        assert!(!wildcard_match("A*C*E", "ABCDF"));
        assert!(!wildcard_match("a*a", "a"));
        assert!(wildcard_match("a*a", "aa"));
        assert!(wildcard_match("EXACT", "EXACT"));
        assert!(!wildcard_match("EXACT", "EXACTLY"));
    }

    #[test]
    fn haversine_sanity() {
        // London to Paris is roughly 344 km
        let d = haversine_km(51.5074, -0.1278, 48.8566, 2.3522);
        assert!((d - 344.0).abs() < 10.0, "got {}", d);
        assert_eq!(haversine_km(10.0, 20.0, 10.0, 20.0), 0.0);
    }
}
