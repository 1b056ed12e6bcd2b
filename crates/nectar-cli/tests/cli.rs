//! End-to-end CLI tests.

use assert_cmd::Command;
use predicates::prelude::*;

const GOOD_RULE: &str = r#"
scanner_ua:
  layer: http
  tags:
    tool: [sqlmap]
  match:
    http.headers.user-agent:
      contains: ["sqlmap"]
      options: { case_insensitive: true }
"#;

fn rules_dir(content: &str) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("rules.yml"), content).unwrap();
    dir
}

#[test]
fn validate_reports_compiled_rules() {
    let dir = rules_dir(GOOD_RULE);
    Command::cargo_bin("nectar")
        .unwrap()
        .args(["validate"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("ok: 1 rules compiled"))
        .stdout(predicate::str::contains("http: 1"));
}

#[test]
fn validate_exits_nonzero_on_broken_rules() {
    let dir = rules_dir("bad:\n  layer: http\n  match:\n    http.uri: { regex: \"([\" }\n");
    Command::cargo_bin("nectar")
        .unwrap()
        .args(["validate"])
        .arg(dir.path())
        .assert()
        .failure();
}

#[test]
fn validate_exits_nonzero_on_missing_directory() {
    Command::cargo_bin("nectar")
        .unwrap()
        .args(["validate", "/no/such/rules/root"])
        .assert()
        .failure();
}

#[test]
fn parse_dumps_the_ast_as_json() {
    let dir = rules_dir(GOOD_RULE);
    Command::cargo_bin("nectar")
        .unwrap()
        .arg("parse")
        .arg(dir.path().join("rules.yml"))
        .assert()
        .success()
        .stdout(predicate::str::contains("\"scanner_ua\""))
        .stdout(predicate::str::contains("\"layer\": \"http\""));
}

#[test]
fn eval_tags_a_matching_sample() {
    let dir = rules_dir(GOOD_RULE);
    Command::cargo_bin("nectar")
        .unwrap()
        .args(["eval", "--rules"])
        .arg(dir.path())
        .args([
            "--event",
            r#"{"uri": "/", "headers": {"User-Agent": "sqlmap/1.5"}}"#,
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"rules\":[\"scanner_ua\"]"))
        .stdout(predicate::str::contains("\"tool\":[\"sqlmap\"]"));
}

#[test]
fn eval_reads_ndjson_from_stdin() {
    let dir = rules_dir(GOOD_RULE);
    let output = Command::cargo_bin("nectar")
        .unwrap()
        .args(["eval", "--rules"])
        .arg(dir.path())
        .write_stdin(concat!(
            r#"{"uri": "/a", "headers": {"User-Agent": "sqlmap/1.5"}}"#,
            "\n",
            r#"{"uri": "/b", "headers": {"User-Agent": "curl/8.0"}}"#,
            "\n",
        ))
        .assert()
        .success();
    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("scanner_ua"));
    assert!(!lines[1].contains("scanner_ua"));
}

#[test]
fn shipped_ruleset_validates() {
    let root = concat!(env!("CARGO_MANIFEST_DIR"), "/../../rules");
    Command::cargo_bin("nectar")
        .unwrap()
        .args(["validate", root])
        .assert()
        .success()
        .stdout(predicate::str::contains("rules compiled"));
}

#[test]
fn eval_respects_config_active_layers() {
    let dir = rules_dir(GOOD_RULE);
    let cfg = tempfile::tempdir().unwrap();
    let cfg_path = cfg.path().join("nectar.yml");
    std::fs::write(&cfg_path, "active_layers: [tcp]\n").unwrap();

    let output = Command::cargo_bin("nectar")
        .unwrap()
        .args(["eval", "--rules"])
        .arg(dir.path())
        .arg("--config")
        .arg(&cfg_path)
        .args([
            "--event",
            r#"{"uri": "/", "headers": {"User-Agent": "sqlmap/1.5"}}"#,
        ])
        .assert()
        .success();
    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    // The http rule is not indexed, so nothing matches.
    assert!(!stdout.contains("scanner_ua"));
}
