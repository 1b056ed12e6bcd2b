//! # nectar-eval
//!
//! Runtime core of the nectar passive network sensor.
//!
//! This crate consumes the rule AST produced by [`nectar_rules`] and
//! evaluates it against observed network events using a compile-then-
//! evaluate model:
//!
//! - **Events** are typed records of one observed interaction (HTTP/HTTPS,
//!   TCP, UDP, ICMP) with session identity and append-only tags.
//! - **Rules** compile once at startup into matcher trees (regexes built,
//!   set literals hashed, needle literals decoded) and are immutable
//!   afterwards; evaluator threads share the [`Engine`] behind an `Arc`.
//! - **Evaluation** walks each rule's tree with short-circuiting, attaches
//!   the static tags of matching rules, and records rule names under the
//!   `rules` tag category. Broken or over-budget rules are warned
//!   non-matches, never aborts.
//! - **Projection** turns an evaluated event into its canonical JSON-line
//!   log record.
//!
//! ## Quick Start
//!
//! ```rust
//! use nectar_eval::{Engine, EngineOptions, Event, EvictionPolicy, Flow,
//!                   HttpRequest, SessionRegistry, project};
//! use nectar_rules::{RuleIndex, parse_rules_str};
//!
//! let rules = parse_rules_str(r#"
//! scanner_ua:
//!   layer: http
//!   tags:
//!     tool: [sqlmap]
//!   match:
//!     http.headers.user-agent:
//!       contains: ["sqlmap"]
//!       options: { case_insensitive: true }
//! "#).unwrap();
//!
//! let engine = Engine::new(&RuleIndex::from_rules(rules), EngineOptions::default()).unwrap();
//! let sessions = SessionRegistry::new(EvictionPolicy::MaxSessions(1024));
//!
//! let request = HttpRequest {
//!     verb: "GET".into(),
//!     proto: "HTTP/1.1".into(),
//!     uri: "/".into(),
//!     headers: vec![("User-Agent".into(), "sqlmap/1.5".into())],
//!     ..Default::default()
//! };
//! let flow = Flow {
//!     src_ip: "198.51.100.7".into(),
//!     dst_ip: "10.0.0.2".into(),
//!     src_port: 43512,
//!     dst_port: 80,
//! };
//!
//! let mut event = Event::from_reassembled_http(request, &flow, &sessions, 16384);
//! engine.evaluate(&mut event);
//! assert_eq!(event.tags["tool"], vec!["sqlmap"]);
//!
//! let record = project(&event);
//! println!("{}", serde_json::to_string(&record).unwrap());
//! ```

pub mod compiler;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod logdata;
pub mod matcher;
pub mod payload;
pub mod session;

// Re-export the most commonly used types and functions at crate root
pub use compiler::{CompiledNode, CompiledRule, compile_rule};
pub use config::{EvictionChoice, SensorConfig};
pub use engine::{Engine, EngineOptions};
pub use error::{EvalError, Result};
pub use event::{
    Event, EventKind, EventPayload, FieldRef, Flow, HeaderMap, HttpData, HttpRequest,
    IcmpData, IcmpPacket, RULES_TAG_CATEGORY, TcpData, TcpSegment, UdpData, UdpDatagram,
};
pub use logdata::{EventLog, HttpLog, IcmpLog, TcpLog, UdpLog, project};
pub use matcher::{CompiledMatcher, Scratch};
pub use payload::{Payload, PayloadLog, decode_field, payload_log};
pub use session::{EvictionPolicy, SessionRegistry};
