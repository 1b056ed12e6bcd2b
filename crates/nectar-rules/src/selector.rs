//! Field selectors: dotted paths resolved at load time to a static field set.
//!
//! Rule files address event fields with paths like `http.uri` or
//! `http.headers.user-agent`. The parser resolves each path to a [`Selector`]
//! variant once, so evaluation is an indexed lookup and never a string
//! dispatch. Unknown paths and layer-incompatible selectors are load-time
//! errors.

use std::fmt;

use serde::Serialize;

use crate::ast::Layer;

/// A resolved field selector.
///
/// `HttpHeader` carries the header name lowercased; header lookup on the
/// event side is ASCII-case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub enum Selector {
    HttpVerb,
    HttpProto,
    HttpUri,
    HttpHeader(String),
    HttpBody,
    HttpIsTls,
    HttpDestHost,
    TcpPayload,
    TcpFlags,
    TcpWindow,
    TcpSeq,
    TcpAck,
    UdpPayload,
    UdpLength,
    IcmpType,
    IcmpCode,
    IpSrc,
    IpDst,
    PortSrc,
    PortDst,
}

impl Selector {
    /// Resolve a dotted selector path. Returns `None` for unknown paths.
    pub fn parse(path: &str) -> Option<Selector> {
        if let Some(name) = path.strip_prefix("http.headers.") {
            if name.is_empty() {
                return None;
            }
            return Some(Selector::HttpHeader(name.to_ascii_lowercase()));
        }
        match path {
            "http.verb" => Some(Selector::HttpVerb),
            "http.proto" => Some(Selector::HttpProto),
            "http.uri" => Some(Selector::HttpUri),
            "http.body" => Some(Selector::HttpBody),
            "http.is_tls" => Some(Selector::HttpIsTls),
            "http.dst_host" => Some(Selector::HttpDestHost),
            "tcp.payload" => Some(Selector::TcpPayload),
            "tcp.flags" => Some(Selector::TcpFlags),
            "tcp.window" => Some(Selector::TcpWindow),
            "tcp.seq" => Some(Selector::TcpSeq),
            "tcp.ack" => Some(Selector::TcpAck),
            "udp.payload" => Some(Selector::UdpPayload),
            "udp.length" => Some(Selector::UdpLength),
            "icmp.type" => Some(Selector::IcmpType),
            "icmp.code" => Some(Selector::IcmpCode),
            "ip.src" => Some(Selector::IpSrc),
            "ip.dst" => Some(Selector::IpDst),
            "port.src" => Some(Selector::PortSrc),
            "port.dst" => Some(Selector::PortDst),
            _ => None,
        }
    }

    /// Whether this selector is valid for rules of the given layer.
    ///
    /// `ip.*` is valid everywhere; `port.*` everywhere except ICMP, which
    /// has no transport ports.
    pub fn valid_for(&self, layer: Layer) -> bool {
        match self {
            Selector::HttpVerb
            | Selector::HttpProto
            | Selector::HttpUri
            | Selector::HttpHeader(_)
            | Selector::HttpBody
            | Selector::HttpIsTls
            | Selector::HttpDestHost => matches!(layer, Layer::Http | Layer::Https),
            Selector::TcpPayload
            | Selector::TcpFlags
            | Selector::TcpWindow
            | Selector::TcpSeq
            | Selector::TcpAck => layer == Layer::Tcp,
            Selector::UdpPayload | Selector::UdpLength => layer == Layer::Udp,
            Selector::IcmpType | Selector::IcmpCode => layer == Layer::Icmp,
            Selector::IpSrc | Selector::IpDst => true,
            Selector::PortSrc | Selector::PortDst => layer != Layer::Icmp,
        }
    }

    /// The dotted path form, as written in rule files.
    pub fn path(&self) -> String {
        match self {
            Selector::HttpVerb => "http.verb".into(),
            Selector::HttpProto => "http.proto".into(),
            Selector::HttpUri => "http.uri".into(),
            Selector::HttpHeader(name) => format!("http.headers.{name}"),
            Selector::HttpBody => "http.body".into(),
            Selector::HttpIsTls => "http.is_tls".into(),
            Selector::HttpDestHost => "http.dst_host".into(),
            Selector::TcpPayload => "tcp.payload".into(),
            Selector::TcpFlags => "tcp.flags".into(),
            Selector::TcpWindow => "tcp.window".into(),
            Selector::TcpSeq => "tcp.seq".into(),
            Selector::TcpAck => "tcp.ack".into(),
            Selector::UdpPayload => "udp.payload".into(),
            Selector::UdpLength => "udp.length".into(),
            Selector::IcmpType => "icmp.type".into(),
            Selector::IcmpCode => "icmp.code".into(),
            Selector::IpSrc => "ip.src".into(),
            Selector::IpDst => "ip.dst".into(),
            Selector::PortSrc => "port.src".into(),
            Selector::PortDst => "port.dst".into(),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

impl From<Selector> for String {
    fn from(s: Selector) -> String {
        s.path()
    }
}
