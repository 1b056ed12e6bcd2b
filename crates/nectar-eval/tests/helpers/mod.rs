//! Shared helpers for the integration suites.
#![allow(dead_code)] // each test binary uses a different subset

use nectar_eval::{
    Engine, EngineOptions, Event, EvictionPolicy, Flow, HttpRequest, SessionRegistry,
};
use nectar_rules::{RuleIndex, parse_rules_str};

pub fn engine(yaml: &str) -> Engine {
    let rules = parse_rules_str(yaml).expect("rule yaml parses");
    Engine::new(&RuleIndex::from_rules(rules), EngineOptions::default()).expect("rules compile")
}

pub fn sessions() -> SessionRegistry {
    SessionRegistry::new(EvictionPolicy::MaxSessions(1024))
}

pub fn flow(src_port: u16) -> Flow {
    Flow {
        src_ip: "198.51.100.7".into(),
        dst_ip: "10.0.0.2".into(),
        src_port,
        dst_port: 80,
    }
}

pub fn http_get(ua: &str, uri: &str) -> HttpRequest {
    HttpRequest {
        verb: "GET".into(),
        proto: "HTTP/1.1".into(),
        uri: uri.into(),
        headers: vec![
            ("Host".into(), "honeypot.example".into()),
            ("User-Agent".into(), ua.into()),
        ],
        ..Default::default()
    }
}

pub fn http_post(uri: &str, body: &[u8]) -> HttpRequest {
    HttpRequest {
        verb: "POST".into(),
        proto: "HTTP/1.1".into(),
        uri: uri.into(),
        headers: vec![("Host".into(), "honeypot.example".into())],
        body: body.to_vec(),
        ..Default::default()
    }
}

pub fn evaluated(engine: &Engine, req: HttpRequest, registry: &SessionRegistry) -> Event {
    let mut ev = Event::from_reassembled_http(req, &flow(43512), registry, 16384);
    engine.evaluate(&mut ev);
    ev
}
