//! Fail-closed compile paths and fail-open evaluation behavior.

mod helpers;

use helpers::{evaluated, http_get, sessions};
use nectar_eval::{Engine, EngineOptions, EvalError};
use nectar_rules::{RuleIndex, parse_rules_str};

fn try_engine(yaml: &str) -> Result<Engine, EvalError> {
    let rules = parse_rules_str(yaml).expect("rule yaml parses");
    Engine::new(&RuleIndex::from_rules(rules), EngineOptions::default())
}

#[test]
fn uncompilable_regex_rejects_startup() {
    let err = try_engine(
        "bad:\n  layer: http\n  match:\n    http.uri: { regex: \"([unclosed\" }\n",
    )
    .unwrap_err();
    assert!(matches!(err, EvalError::InvalidRegex { .. }));
}

#[test]
fn malformed_binary_pattern_rejects_startup() {
    let err = try_engine(
        "bad:\n  layer: tcp\n  match:\n    tcp.payload: { pattern: \"dead beXf\" }\n",
    )
    .unwrap_err();
    assert!(matches!(err, EvalError::InvalidPattern { .. }));
}

#[test]
fn one_bad_rule_fails_the_whole_set() {
    // Fail-closed: the good rule does not save the load.
    let err = try_engine(
        r#"
good:
  layer: http
  match:
    http.uri: { contains: "/" }
bad:
  layer: http
  match:
    http.uri: { regex: "([" }
"#,
    );
    assert!(err.is_err());
}

#[test]
fn broken_decode_never_silences_other_rules() {
    // Fail-open at evaluation: the first rule decodes garbage (non-match),
    // the second still fires.
    let engine = try_engine(
        r#"
wants_base64:
  layer: http
  match:
    http.headers.user-agent:
      contains: ["x"]
      options: { decode: base64 }
healthy:
  layer: http
  tags:
    state: [ok]
  match:
    http.uri: { starts_with: ["/"] }
"#,
    )
    .unwrap();
    let registry = sessions();
    let ev = evaluated(&engine, http_get("!!! not base64 !!!", "/"), &registry);
    assert!(!ev.has_rule("wants_base64"));
    assert!(ev.has_rule("healthy"));
}

#[test]
fn missing_header_is_a_defined_non_match() {
    let engine = try_engine(
        r#"
wants_header:
  layer: http
  match:
    http.headers.x-api-key: { equals: "secret" }
"#,
    )
    .unwrap();
    let registry = sessions();
    let ev = evaluated(&engine, http_get("curl", "/"), &registry);
    assert!(ev.tags.is_empty());
    assert!(ev.errors.is_empty());
}
