//! Directory-based rule loading and the per-layer rule index.
//!
//! The rules root is walked recursively in sorted order so load order (and
//! therefore tag attachment order) is stable across runs. `.yml` files are
//! parsed as rule mappings; skip-list names are ignored; any other extension
//! is warned about and skipped. A parse or validation failure is fatal: the
//! sensor refuses to run with an inconsistent rule set.

use std::collections::HashMap;
use std::path::Path;

use tracing::{info, warn};

use crate::ast::{Layer, Rule};
use crate::error::{Result, RuleError};
use crate::parser::parse_rules_file;

/// Extension of rule files.
pub const RULE_EXT: &str = "yml";

/// File names ignored while walking the rules root (directory markers).
const SKIPLIST: [&str; 2] = [".gitkeep", ".gitignore"];

/// Immutable per-layer rule store, built once at startup.
///
/// Reload is replace-not-mutate: build a fresh index and swap the `Arc`
/// handed to the evaluator.
#[derive(Debug, Default)]
pub struct RuleIndex {
    by_layer: HashMap<Layer, Vec<Rule>>,
}

impl RuleIndex {
    /// Build an index directly from parsed rules, partitioned by layer in
    /// iteration order. `load_dir` is the file-backed path; this one serves
    /// embedders and tests.
    pub fn from_rules(rules: impl IntoIterator<Item = Rule>) -> RuleIndex {
        let mut index = RuleIndex::default();
        for rule in rules {
            index.push(rule);
        }
        index
    }

    /// Rules of one layer, in load order.
    pub fn rules_for(&self, layer: Layer) -> &[Rule] {
        self.by_layer.get(&layer).map_or(&[], Vec::as_slice)
    }

    /// Layers that have at least one rule.
    pub fn layers(&self) -> impl Iterator<Item = Layer> + '_ {
        Layer::ALL
            .into_iter()
            .filter(|l| !self.rules_for(*l).is_empty())
    }

    /// Total rule count across all layers.
    pub fn total(&self) -> usize {
        self.by_layer.values().map(Vec::len).sum()
    }

    fn push(&mut self, rule: Rule) {
        self.by_layer.entry(rule.layer).or_default().push(rule);
    }
}

/// Walk `root` and load every rule file into a per-layer index.
///
/// Only rules whose layer is listed in `active_layers` are kept; the others
/// parse (so broken files still fail the load) but are not indexed. Returns
/// the index; `RuleIndex::total` is the operator-facing count.
pub fn load_dir(root: &Path, active_layers: &[Layer]) -> Result<RuleIndex> {
    let mut index = RuleIndex::default();
    walk(root, active_layers, &mut index)?;
    info!(
        rules = index.total(),
        root = %root.display(),
        "loaded rule set"
    );
    Ok(index)
}

fn walk(dir: &Path, active_layers: &[Layer], index: &mut RuleIndex) -> Result<()> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .map_err(|e| RuleError::from(e).in_file(dir))?
        .collect::<std::io::Result<_>>()
        .map_err(|e| RuleError::from(e).in_file(dir))?;
    entries.sort_by_key(std::fs::DirEntry::file_name);

    for entry in entries {
        let path = entry.path();
        if path.is_dir() {
            walk(&path, active_layers, index)?;
            continue;
        }

        let name = entry.file_name();
        if SKIPLIST.iter().any(|s| name == *s) {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some(RULE_EXT) {
            warn!(path = %path.display(), "skipping non-rule file (wanted: .{RULE_EXT})");
            continue;
        }

        for rule in parse_rules_file(&path)? {
            if active_layers.contains(&rule.layer) {
                index.push(rule);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).unwrap();
    }

    const HTTP_RULE: &str = r#"
ua_rule:
  layer: http
  match:
    http.headers.user-agent: { contains: "curl" }
"#;

    const TCP_RULE: &str = r#"
payload_rule:
  layer: tcp
  match:
    tcp.payload: { contains: "SSH-" }
"#;

    #[test]
    fn loads_recursively_and_partitions_by_layer() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "http.yml", HTTP_RULE);
        let sub = dir.path().join("transport");
        fs::create_dir(&sub).unwrap();
        write(&sub, "tcp.yml", TCP_RULE);

        let index = load_dir(dir.path(), &Layer::ALL).unwrap();
        assert_eq!(index.total(), 2);
        assert_eq!(index.rules_for(Layer::Http).len(), 1);
        assert_eq!(index.rules_for(Layer::Tcp).len(), 1);
        assert!(index.rules_for(Layer::Udp).is_empty());
    }

    #[test]
    fn total_equals_sum_across_layers() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.yml", HTTP_RULE);
        write(dir.path(), "b.yml", TCP_RULE);
        let index = load_dir(dir.path(), &Layer::ALL).unwrap();
        let sum: usize = Layer::ALL.iter().map(|l| index.rules_for(*l).len()).sum();
        assert_eq!(index.total(), sum);
    }

    #[test]
    fn inactive_layers_are_not_indexed() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.yml", HTTP_RULE);
        write(dir.path(), "b.yml", TCP_RULE);
        let index = load_dir(dir.path(), &[Layer::Http]).unwrap();
        assert_eq!(index.total(), 1);
        assert!(index.rules_for(Layer::Tcp).is_empty());
    }

    #[test]
    fn skiplist_and_foreign_extensions_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), ".gitkeep", "");
        write(dir.path(), "notes.txt", "not yaml at all {{{");
        write(dir.path(), "a.yml", HTTP_RULE);
        let index = load_dir(dir.path(), &Layer::ALL).unwrap();
        assert_eq!(index.total(), 1);
    }

    #[test]
    fn parse_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "good.yml", HTTP_RULE);
        write(dir.path(), "zz_bad.yml", "broken: [unclosed\n");
        assert!(load_dir(dir.path(), &Layer::ALL).is_err());
    }

    #[test]
    fn load_order_is_sorted_by_file_name() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "b.yml",
            "second:\n  layer: http\n  match:\n    http.verb: { equals: \"GET\" }\n",
        );
        write(
            dir.path(),
            "a.yml",
            "first:\n  layer: http\n  match:\n    http.verb: { equals: \"GET\" }\n",
        );
        let index = load_dir(dir.path(), &Layer::ALL).unwrap();
        let names: Vec<_> = index
            .rules_for(Layer::Http)
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no-such-dir");
        assert!(load_dir(&missing, &Layer::ALL).is_err());
    }
}
