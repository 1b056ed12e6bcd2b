//! Canonical log records: the pure projection of an evaluated event into
//! its serialized form.
//!
//! One JSON line per observed event. Field names are stable; key order is
//! not guaranteed. The projector never mutates the event.

use std::collections::BTreeMap;

use chrono::SecondsFormat;
use serde::Serialize;

use nectar_rules::Tags;

use crate::event::{Event, EventKind, EventPayload};
use crate::payload::PayloadLog;

/// The canonical record of one observed event.
#[derive(Debug, Clone, Serialize)]
pub struct EventLog {
    /// RFC3339 with nanosecond precision.
    pub timestamp: String,
    pub kind: EventKind,
    pub session: String,
    pub src_ip: String,
    pub dst_ip: String,
    pub src_port: u16,
    pub dst_port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpLog>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tcp: Option<TcpLog>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub udp: Option<UdpLog>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icmp: Option<IcmpLog>,
    pub tags: Tags,
    pub additional: BTreeMap<String, String>,
    pub errors: Vec<String>,
}

/// HTTP payload block. The folded `headers` map keeps the first value per
/// name; `headers_keys`/`headers_values` preserve every observation in
/// observed order.
#[derive(Debug, Clone, Serialize)]
pub struct HttpLog {
    pub verb: String,
    pub proto: String,
    #[serde(rename = "URI")]
    pub uri: String,
    pub dst_host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub headers_keys: Vec<String>,
    pub headers_values: Vec<String>,
    pub body: PayloadLog,
    pub is_tls: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TcpLog {
    pub payload: PayloadLog,
    pub flags: String,
    pub window: u16,
    pub seq: u32,
    pub ack: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct UdpLog {
    pub payload: PayloadLog,
    pub length: u16,
}

#[derive(Debug, Clone, Serialize)]
pub struct IcmpLog {
    #[serde(rename = "type")]
    pub icmp_type: u8,
    pub code: u8,
    pub payload: PayloadLog,
}

/// Project an event into its canonical log record.
pub fn project(event: &Event) -> EventLog {
    let mut log = EventLog {
        timestamp: event
            .timestamp
            .to_rfc3339_opts(SecondsFormat::Nanos, true),
        kind: event.kind,
        session: event.session.clone(),
        src_ip: event.source_ip.clone(),
        dst_ip: event.dest_ip.clone(),
        src_port: event.source_port,
        dst_port: event.dest_port,
        http: None,
        tcp: None,
        udp: None,
        icmp: None,
        tags: event.tags.clone(),
        additional: event.additional.clone(),
        errors: event.errors.clone(),
    };

    match &event.payload {
        EventPayload::Http(http) => {
            log.http = Some(HttpLog {
                verb: http.verb.clone(),
                proto: http.proto.clone(),
                uri: http.uri.clone(),
                dst_host: http.dest_host.clone(),
                user_agent: http.headers.get("user-agent").map(str::to_string),
                headers: http.headers.folded(),
                headers_keys: http.headers.keys().iter().map(|s| s.to_string()).collect(),
                headers_values: http.headers.values().iter().map(|s| s.to_string()).collect(),
                body: http.body.to_log(),
                is_tls: http.is_tls,
            });
        }
        EventPayload::Tcp(tcp) => {
            log.tcp = Some(TcpLog {
                payload: tcp.payload.to_log(),
                flags: tcp.flags.clone(),
                window: tcp.window,
                seq: tcp.seq,
                ack: tcp.ack,
            });
        }
        EventPayload::Udp(udp) => {
            log.udp = Some(UdpLog {
                payload: udp.payload.to_log(),
                length: udp.length,
            });
        }
        EventPayload::Icmp(icmp) => {
            log.icmp = Some(IcmpLog {
                icmp_type: icmp.icmp_type,
                code: icmp.code,
                payload: icmp.payload.to_log(),
            });
        }
    }

    log
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Flow, HttpRequest, UdpDatagram};
    use crate::session::{EvictionPolicy, SessionRegistry};

    fn http_event() -> Event {
        let sessions = SessionRegistry::new(EvictionPolicy::MaxSessions(64));
        Event::from_reassembled_http(
            HttpRequest {
                verb: "POST".into(),
                proto: "HTTP/1.1".into(),
                uri: "/wp-login.php".into(),
                headers: vec![
                    ("Host".into(), "honeypot.example".into()),
                    ("User-Agent".into(), "sqlmap/1.5".into()),
                    ("X-Forwarded-For".into(), "203.0.113.1".into()),
                    ("x-forwarded-for".into(), "203.0.113.2".into()),
                ],
                body: b"log=admin&pwd=x".to_vec(),
                is_tls: false,
                remote_addr: None,
                host: None,
            },
            &Flow {
                src_ip: "198.51.100.7".into(),
                dst_ip: "10.0.0.2".into(),
                src_port: 43512,
                dst_port: 80,
            },
            &sessions,
            4096,
        )
    }

    #[test]
    fn projection_does_not_mutate_the_event() {
        let ev = http_event();
        let before = ev.clone();
        let _ = project(&ev);
        assert_eq!(ev, before);
    }

    #[test]
    fn http_block_carries_both_header_projections() {
        let log = project(&http_event());
        let http = log.http.expect("http block");
        // Folded: first value wins.
        assert_eq!(http.headers["X-Forwarded-For"], "203.0.113.1");
        assert_eq!(http.headers.len(), 3);
        // Parallel lists: every observation, in order.
        assert_eq!(http.headers_keys.len(), 4);
        assert_eq!(http.headers_values[3], "203.0.113.2");
        assert_eq!(http.user_agent.as_deref(), Some("sqlmap/1.5"));
        assert!(log.tcp.is_none());
    }

    #[test]
    fn timestamp_is_rfc3339_with_nanoseconds() {
        let log = project(&http_event());
        // e.g. 2026-08-02T11:22:33.123456789Z
        assert!(log.timestamp.ends_with('Z'));
        let frac = log.timestamp.split('.').nth(1).expect("fractional part");
        assert_eq!(frac.len(), "123456789Z".len());
    }

    #[test]
    fn udp_event_projects_its_own_block() {
        let sessions = SessionRegistry::new(EvictionPolicy::MaxSessions(64));
        let ev = Event::from_udp(
            UdpDatagram {
                payload: b"A".repeat(2048),
                length: 2048,
            },
            &Flow {
                src_ip: "198.51.100.7".into(),
                dst_ip: "10.0.0.2".into(),
                src_port: 5353,
                dst_port: 53,
            },
            &sessions,
            1024,
        );
        let log = project(&ev);
        let udp = log.udp.expect("udp block");
        assert!(udp.payload.truncated);
        assert_eq!(udp.payload.original_size, 2048);
        assert!(log.http.is_none());
    }

    #[test]
    fn record_serializes_as_json_with_stable_names() {
        let log = project(&http_event());
        let json = serde_json::to_value(&log).unwrap();
        assert_eq!(json["kind"], "http");
        assert_eq!(json["dst_port"], 80);
        assert!(json["http"]["URI"].is_string());
        assert!(json["http"]["body"]["encoding"] == "base64");
        assert!(json.get("tcp").is_none());
    }
}
