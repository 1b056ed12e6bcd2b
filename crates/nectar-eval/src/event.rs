//! The event model: one observed network interaction with typed per-layer
//! fields, session identity, and append-only tags.
//!
//! Events carry a tagged payload variant consistent with their kind; the
//! evaluator switches on the variant through [`Event::field`] rather than
//! reflecting over field names. Constructor-time parse failures accumulate
//! in `errors` instead of aborting — the event stays evaluable on whatever
//! fields are present.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use nectar_rules::{Layer, Selector, Tags};

use crate::payload::Payload;
use crate::session::SessionRegistry;

/// Tag category recording the names of matched rules.
pub const RULES_TAG_CATEGORY: &str = "rules";

// =============================================================================
// Event kind
// =============================================================================

/// The observed kind of an event. Finer-grained than [`Layer`]: ICMPv4 and
/// ICMPv6 stay distinct here and share the `icmp` rule layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Http,
    Https,
    Tcp,
    Udp,
    Icmpv4,
    Icmpv6,
}

impl EventKind {
    /// The rule layer this kind is matched against.
    pub fn layer(&self) -> Layer {
        match self {
            EventKind::Http => Layer::Http,
            EventKind::Https => Layer::Https,
            EventKind::Tcp => Layer::Tcp,
            EventKind::Udp => Layer::Udp,
            EventKind::Icmpv4 | EventKind::Icmpv6 => Layer::Icmp,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Http => "http",
            EventKind::Https => "https",
            EventKind::Tcp => "tcp",
            EventKind::Udp => "udp",
            EventKind::Icmpv4 => "icmpv4",
            EventKind::Icmpv6 => "icmpv6",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Headers
// =============================================================================

/// HTTP headers with ASCII-case-insensitive lookup.
///
/// Every observation is preserved in order, including duplicates; the folded
/// view keeps the first value per name. Both projections land in the log
/// record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    pub fn from_pairs(entries: Vec<(String, String)>) -> HeaderMap {
        HeaderMap { entries }
    }

    /// First value observed for `name`, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Header names in observed order (duplicates included).
    pub fn keys(&self) -> Vec<&str> {
        self.entries.iter().map(|(k, _)| k.as_str()).collect()
    }

    /// Header values in observed order (duplicates included).
    pub fn values(&self) -> Vec<&str> {
        self.entries.iter().map(|(_, v)| v.as_str()).collect()
    }

    /// The folded view: first value wins per name, keyed by the name as
    /// first observed.
    pub fn folded(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        for (k, v) in &self.entries {
            if !map.keys().any(|seen: &String| seen.eq_ignore_ascii_case(k)) {
                map.insert(k.clone(), v.clone());
            }
        }
        map
    }

    /// `Name: value` lines in observed order.
    pub fn inline(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|(k, v)| format!("{k}: {v}"))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// Collaborator inputs
// =============================================================================

/// A parsed HTTP request at the event boundary, delivered by the capture
/// pipeline or the decoy TLS server.
#[derive(Debug, Clone, Default)]
pub struct HttpRequest {
    pub verb: String,
    pub proto: String,
    pub uri: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub is_tls: bool,
    /// `ip:port` of the peer; set on the decoy path.
    pub remote_addr: Option<String>,
    /// `host:port` the request was addressed to; set on the decoy path.
    pub host: Option<String>,
}

/// Network/transport addressing of a reassembled flow.
#[derive(Debug, Clone, Default)]
pub struct Flow {
    pub src_ip: String,
    pub dst_ip: String,
    pub src_port: u16,
    pub dst_port: u16,
}

/// A parsed TCP segment at the event boundary.
#[derive(Debug, Clone, Default)]
pub struct TcpSegment {
    pub payload: Vec<u8>,
    /// Canonical flag letters in `FSRPAUEC` order, e.g. `"PA"`.
    pub flags: String,
    pub window: u16,
    pub seq: u32,
    pub ack: u32,
}

/// A parsed UDP datagram at the event boundary.
#[derive(Debug, Clone, Default)]
pub struct UdpDatagram {
    pub payload: Vec<u8>,
    pub length: u16,
}

/// A parsed ICMP packet at the event boundary.
#[derive(Debug, Clone, Default)]
pub struct IcmpPacket {
    pub icmp_type: u8,
    pub code: u8,
    pub payload: Vec<u8>,
}

// =============================================================================
// Per-layer payload data
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct HttpData {
    pub verb: String,
    pub proto: String,
    pub uri: String,
    pub dest_host: String,
    pub headers: HeaderMap,
    pub body: Payload,
    pub is_tls: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TcpData {
    pub payload: Payload,
    pub flags: String,
    pub window: u16,
    pub seq: u32,
    pub ack: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UdpData {
    pub payload: Payload,
    pub length: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IcmpData {
    pub icmp_type: u8,
    pub code: u8,
    pub payload: Payload,
}

/// The layer-specific part of an event, always consistent with its kind.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    Http(HttpData),
    Tcp(TcpData),
    Udp(UdpData),
    Icmp(IcmpData),
}

// =============================================================================
// Event
// =============================================================================

/// One observed network event.
///
/// `tags` and `additional` are always present (empty rather than missing)
/// and only the evaluator appends to `tags`.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    pub session: String,
    pub source_ip: String,
    pub dest_ip: String,
    pub source_port: u16,
    pub dest_port: u16,
    pub timestamp: DateTime<Utc>,
    pub tags: Tags,
    pub additional: BTreeMap<String, String>,
    pub errors: Vec<String>,
    pub payload: EventPayload,
}

/// A borrowed field value resolved from an event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldRef<'a> {
    Bytes(&'a [u8]),
    Str(&'a str),
    UInt(u64),
    Bool(bool),
    /// The selector addresses a field this event does not carry (e.g. a
    /// header that was never sent). A defined non-match, not an error.
    Missing,
}

impl Event {
    fn base(kind: EventKind, session: String, payload: EventPayload) -> Event {
        Event {
            kind,
            session,
            source_ip: String::new(),
            dest_ip: String::new(),
            source_port: 0,
            dest_port: 0,
            timestamp: Utc::now(),
            tags: Tags::new(),
            additional: BTreeMap::new(),
            errors: Vec::new(),
            payload,
        }
    }

    /// Build an event from an HTTP request reassembled out of captured
    /// packets. Flow information supplies addressing, and the session ID is
    /// stable for the underlying transport flow.
    pub fn from_reassembled_http(
        req: HttpRequest,
        flow: &Flow,
        sessions: &SessionRegistry,
        max_body: usize,
    ) -> Event {
        let kind = if req.is_tls {
            EventKind::Https
        } else {
            EventKind::Http
        };
        let key = SessionRegistry::flow_key(&flow.src_ip, flow.src_port, &flow.dst_ip, flow.dst_port);
        let session = sessions.get_uid(&key);

        let data = HttpData {
            verb: req.verb,
            proto: req.proto,
            uri: req.uri,
            dest_host: flow.dst_ip.clone(),
            headers: HeaderMap::from_pairs(req.headers),
            body: Payload::capped(req.body, max_body),
            is_tls: req.is_tls,
        };

        let mut ev = Event::base(kind, session, EventPayload::Http(data));
        ev.source_ip = flow.src_ip.clone();
        ev.dest_ip = flow.dst_ip.clone();
        ev.source_port = flow.src_port;
        ev.dest_port = flow.dst_port;
        ev
    }

    /// Build an event from a request served by the decoy web server, where
    /// no reassembled transport tuple exists. Addressing is recovered from
    /// `RemoteAddr`/`Host`; split failures are recorded in `errors` and a
    /// fresh session ID is allocated per event.
    pub fn from_decoy_http(
        req: HttpRequest,
        sessions: &SessionRegistry,
        max_body: usize,
    ) -> Event {
        let kind = if req.is_tls {
            EventKind::Https
        } else {
            EventKind::Http
        };
        let mut errors = Vec::new();

        let (src_ip, src_port) = match req.remote_addr.as_deref().map(split_host_port) {
            Some(Ok(pair)) => pair,
            Some(Err(e)) => {
                errors.push(e);
                (String::new(), 0)
            }
            None => {
                errors.push("missing remote address".to_string());
                (String::new(), 0)
            }
        };
        let (dest_host, dst_port) = match req.host.as_deref().map(split_host_port) {
            Some(Ok(pair)) => pair,
            Some(Err(e)) => {
                errors.push(e);
                (req.host.clone().unwrap_or_default(), 0)
            }
            None => {
                errors.push("missing host".to_string());
                (String::new(), 0)
            }
        };

        let data = HttpData {
            verb: req.verb,
            proto: req.proto,
            uri: req.uri,
            dest_host: dest_host.clone(),
            headers: HeaderMap::from_pairs(req.headers),
            body: Payload::capped(req.body, max_body),
            is_tls: req.is_tls,
        };

        let mut ev = Event::base(kind, sessions.allocate(), EventPayload::Http(data));
        ev.source_ip = src_ip;
        ev.dest_ip = dest_host;
        ev.source_port = src_port;
        ev.dest_port = dst_port;
        ev.errors = errors;
        ev
    }

    /// Build an event from a parsed TCP segment.
    pub fn from_tcp(
        seg: TcpSegment,
        flow: &Flow,
        sessions: &SessionRegistry,
        max_payload: usize,
    ) -> Event {
        let key = SessionRegistry::flow_key(&flow.src_ip, flow.src_port, &flow.dst_ip, flow.dst_port);
        let data = TcpData {
            payload: Payload::capped(seg.payload, max_payload),
            flags: seg.flags,
            window: seg.window,
            seq: seg.seq,
            ack: seg.ack,
        };
        let mut ev = Event::base(EventKind::Tcp, sessions.get_uid(&key), EventPayload::Tcp(data));
        ev.source_ip = flow.src_ip.clone();
        ev.dest_ip = flow.dst_ip.clone();
        ev.source_port = flow.src_port;
        ev.dest_port = flow.dst_port;
        ev
    }

    /// Build an event from a parsed UDP datagram.
    pub fn from_udp(
        dgram: UdpDatagram,
        flow: &Flow,
        sessions: &SessionRegistry,
        max_payload: usize,
    ) -> Event {
        let key = SessionRegistry::flow_key(&flow.src_ip, flow.src_port, &flow.dst_ip, flow.dst_port);
        let data = UdpData {
            payload: Payload::capped(dgram.payload, max_payload),
            length: dgram.length,
        };
        let mut ev = Event::base(EventKind::Udp, sessions.get_uid(&key), EventPayload::Udp(data));
        ev.source_ip = flow.src_ip.clone();
        ev.dest_ip = flow.dst_ip.clone();
        ev.source_port = flow.src_port;
        ev.dest_port = flow.dst_port;
        ev
    }

    /// Build an event from a parsed ICMP packet. Ports stay zero; the
    /// session key is the addressing pair alone.
    pub fn from_icmp(
        pkt: IcmpPacket,
        v6: bool,
        src_ip: &str,
        dst_ip: &str,
        sessions: &SessionRegistry,
        max_payload: usize,
    ) -> Event {
        let kind = if v6 { EventKind::Icmpv6 } else { EventKind::Icmpv4 };
        let key = SessionRegistry::flow_key(src_ip, 0, dst_ip, 0);
        let data = IcmpData {
            icmp_type: pkt.icmp_type,
            code: pkt.code,
            payload: Payload::capped(pkt.payload, max_payload),
        };
        let mut ev = Event::base(kind, sessions.get_uid(&key), EventPayload::Icmp(data));
        ev.source_ip = src_ip.to_string();
        ev.dest_ip = dst_ip.to_string();
        ev
    }

    /// Resolve a selector against this event's fields.
    ///
    /// Selectors addressing another layer's fields resolve to `Missing`
    /// (a defined non-match); the loader already rejects those shapes for
    /// the rule's own layer.
    pub fn field(&self, selector: &Selector) -> FieldRef<'_> {
        match selector {
            Selector::IpSrc => FieldRef::Str(&self.source_ip),
            Selector::IpDst => FieldRef::Str(&self.dest_ip),
            Selector::PortSrc => FieldRef::UInt(u64::from(self.source_port)),
            Selector::PortDst => FieldRef::UInt(u64::from(self.dest_port)),
            _ => match &self.payload {
                EventPayload::Http(http) => http_field(http, selector),
                EventPayload::Tcp(tcp) => tcp_field(tcp, selector),
                EventPayload::Udp(udp) => udp_field(udp, selector),
                EventPayload::Icmp(icmp) => icmp_field(icmp, selector),
            },
        }
    }

    /// Whether a rule of this name has already been recorded on the event.
    pub fn has_rule(&self, name: &str) -> bool {
        self.tags
            .get(RULES_TAG_CATEGORY)
            .is_some_and(|names| names.iter().any(|n| n == name))
    }

    /// Attach a matched rule: its static tags, then its name under the
    /// `rules` category. Values append in call order.
    pub fn attach_match(&mut self, name: &str, tags: &Tags) {
        for (category, values) in tags {
            self.tags
                .entry(category.clone())
                .or_default()
                .extend(values.iter().cloned());
        }
        self.tags
            .entry(RULES_TAG_CATEGORY.to_string())
            .or_default()
            .push(name.to_string());
    }
}

fn http_field<'a>(http: &'a HttpData, selector: &Selector) -> FieldRef<'a> {
    match selector {
        Selector::HttpVerb => FieldRef::Str(&http.verb),
        Selector::HttpProto => FieldRef::Str(&http.proto),
        Selector::HttpUri => FieldRef::Str(&http.uri),
        Selector::HttpDestHost => FieldRef::Str(&http.dest_host),
        Selector::HttpHeader(name) => match http.headers.get(name) {
            Some(v) => FieldRef::Str(v),
            None => FieldRef::Missing,
        },
        Selector::HttpBody => FieldRef::Bytes(&http.body.data),
        Selector::HttpIsTls => FieldRef::Bool(http.is_tls),
        _ => FieldRef::Missing,
    }
}

fn tcp_field<'a>(tcp: &'a TcpData, selector: &Selector) -> FieldRef<'a> {
    match selector {
        Selector::TcpPayload => FieldRef::Bytes(&tcp.payload.data),
        Selector::TcpFlags => FieldRef::Str(&tcp.flags),
        Selector::TcpWindow => FieldRef::UInt(u64::from(tcp.window)),
        Selector::TcpSeq => FieldRef::UInt(u64::from(tcp.seq)),
        Selector::TcpAck => FieldRef::UInt(u64::from(tcp.ack)),
        _ => FieldRef::Missing,
    }
}

fn udp_field<'a>(udp: &'a UdpData, selector: &Selector) -> FieldRef<'a> {
    match selector {
        Selector::UdpPayload => FieldRef::Bytes(&udp.payload.data),
        Selector::UdpLength => FieldRef::UInt(u64::from(udp.length)),
        _ => FieldRef::Missing,
    }
}

fn icmp_field<'a>(icmp: &'a IcmpData, selector: &Selector) -> FieldRef<'a> {
    match selector {
        Selector::IcmpType => FieldRef::UInt(u64::from(icmp.icmp_type)),
        Selector::IcmpCode => FieldRef::UInt(u64::from(icmp.code)),
        _ => FieldRef::Missing,
    }
}

/// Split `host:port` into its parts. IPv6 brackets are stripped.
fn split_host_port(addr: &str) -> Result<(String, u16), String> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| format!("address '{addr}' has no port"))?;
    let port: u16 = port
        .parse()
        .map_err(|_| format!("address '{addr}' has an invalid port"))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    Ok((host.to_string(), port))
}
