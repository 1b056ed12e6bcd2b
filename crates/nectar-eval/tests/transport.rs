//! Lower-layer scenarios: TCP, UDP, and ICMP events against their rule
//! layers.

mod helpers;

use helpers::{engine, flow, sessions};
use nectar_eval::{Event, IcmpPacket, TcpSegment, UdpDatagram};

#[test]
fn tcp_binary_pattern_scans_the_payload() {
    let engine = engine(
        r#"
beacon_marker:
  layer: tcp
  tags:
    family: [beacon]
  match:
    tcp.payload: { pattern: "de ad ?? ef" }
"#,
    );
    let registry = sessions();

    let seg = TcpSegment {
        payload: vec![0x00, 0xde, 0xad, 0x42, 0xef, 0x99],
        flags: "PA".into(),
        window: 1024,
        seq: 1,
        ack: 1,
    };
    let mut ev = Event::from_tcp(seg, &flow(40000), &registry, 4096);
    engine.evaluate(&mut ev);
    assert!(ev.has_rule("beacon_marker"));

    let miss = TcpSegment {
        payload: vec![0xde, 0xad],
        ..Default::default()
    };
    let mut ev = Event::from_tcp(miss, &flow(40001), &registry, 4096);
    engine.evaluate(&mut ev);
    assert!(ev.tags.is_empty());
}

#[test]
fn tcp_flags_and_window_combine() {
    let engine = engine(
        r#"
quiet_syn:
  layer: tcp
  match:
    tcp.flags: { in: ["S"] }
    tcp.window: { lte: 1024 }
"#,
    );
    let registry = sessions();

    let syn = TcpSegment {
        flags: "S".into(),
        window: 512,
        ..Default::default()
    };
    let mut ev = Event::from_tcp(syn, &flow(40000), &registry, 4096);
    engine.evaluate(&mut ev);
    assert!(ev.has_rule("quiet_syn"));

    let wide_syn = TcpSegment {
        flags: "S".into(),
        window: 65535,
        ..Default::default()
    };
    let mut ev = Event::from_tcp(wide_syn, &flow(40001), &registry, 4096);
    engine.evaluate(&mut ev);
    assert!(ev.tags.is_empty());
}

#[test]
fn udp_payload_rules_match() {
    let engine = engine(
        r#"
dns_any_probe:
  layer: udp
  match:
    udp.payload:
      contains: ["0000ff0001"]
      options: { encoding: hex }
    port.dst: { eq: 53 }
"#,
    );
    let registry = sessions();

    let mut probe_flow = flow(5353);
    probe_flow.dst_port = 53;
    let dgram = UdpDatagram {
        payload: b"\x12\x34\x00\x00\xff\x00\x01".to_vec(),
        length: 7,
    };
    let mut ev = Event::from_udp(dgram, &probe_flow, &registry, 4096);
    engine.evaluate(&mut ev);
    assert!(ev.has_rule("dns_any_probe"));
}

#[test]
fn icmp_rules_cover_both_families() {
    let engine = engine(
        r#"
echo_request:
  layer: icmp
  match:
    icmp.type: { in: ["8", "128"] }
"#,
    );
    let registry = sessions();

    let v4 = IcmpPacket {
        icmp_type: 8,
        code: 0,
        payload: b"ping".to_vec(),
    };
    let mut ev = Event::from_icmp(v4, false, "192.0.2.1", "192.0.2.2", &registry, 64);
    engine.evaluate(&mut ev);
    assert!(ev.has_rule("echo_request"));

    let v6 = IcmpPacket {
        icmp_type: 128,
        code: 0,
        payload: b"ping6".to_vec(),
    };
    let mut ev = Event::from_icmp(v6, true, "2001:db8::1", "2001:db8::2", &registry, 64);
    engine.evaluate(&mut ev);
    assert!(ev.has_rule("echo_request"));

    let reply = IcmpPacket {
        icmp_type: 0,
        code: 0,
        payload: Vec::new(),
    };
    let mut ev = Event::from_icmp(reply, false, "192.0.2.1", "192.0.2.2", &registry, 64);
    engine.evaluate(&mut ev);
    assert!(ev.tags.is_empty());
}

#[test]
fn ip_selectors_apply_to_any_layer() {
    let engine = engine(
        r#"
watchlist_source:
  layer: udp
  tags:
    list: [watch]
  match:
    ip.src: { in: ["198.51.100.7"] }
"#,
    );
    let registry = sessions();
    let dgram = UdpDatagram {
        payload: Vec::new(),
        length: 0,
    };
    let mut ev = Event::from_udp(dgram, &flow(9999), &registry, 4096);
    engine.evaluate(&mut ev);
    assert_eq!(ev.tags["list"], vec!["watch"]);
}
