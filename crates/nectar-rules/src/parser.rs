//! YAML → AST parser for nectar rule files.
//!
//! A rule file is a mapping of `rule_name → rule body`; a rule body carries
//! `layer`, `meta`, `tags`, and `match`. The `match` section mixes selector
//! keys (leaves) with `group` keys (nested AND/OR); a mapping of entries is
//! an implicit AND.
//!
//! The match surface is deliberately polymorphic (a leaf value may carry one
//! needle or a list, a group body nests arbitrarily), so parsing goes through
//! `serde_yaml::Value` with explicit disambiguation on the keys present.
//! Ambiguous shapes are rejected rather than guessed at.
//!
//! Normalization applied here:
//! 1. every leaf becomes a canonical [`LeafMatch`]
//! 2. unary groups are collapsed
//! 3. an empty `match` becomes a match-all root, with a warning
//! 4. selectors are resolved against the static per-layer field set
//!
//! Regex/pattern compilation and needle pre-decoding happen in the
//! evaluator's compile step; both are still load-time and fail-closed.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde_yaml::{Mapping, Value};
use tracing::warn;

use crate::ast::{
    Decode, GroupOp, Layer, LeafMatch, LeafOptions, MatchNode, MetaValue, NeedleEncoding, NumOp,
    Predicate, Rule, Tags,
};
use crate::error::{Result, RuleError};
use crate::selector::Selector;

/// Keys of a rule body. Anything else is a schema violation.
const RULE_KEYS: [&str; 4] = ["layer", "meta", "tags", "match"];

/// Leaf body keys that are not primitives.
const LEAF_OPTION_KEYS: [&str; 2] = ["options", "all"];

// =============================================================================
// Public API
// =============================================================================

/// Parse a YAML string containing a mapping of named rules.
///
/// Rules come back in document order. Any structural problem — bad layer,
/// unknown selector, ambiguous leaf, duplicate name — fails the whole file.
pub fn parse_rules_str(yaml: &str) -> Result<Vec<Rule>> {
    let value: Value = serde_yaml::from_str(yaml)?;
    if value.is_null() {
        // An empty file carries no rules; not an error.
        return Ok(Vec::new());
    }
    let mapping = value.as_mapping().ok_or(RuleError::NotAMapping)?;

    let mut rules = Vec::with_capacity(mapping.len());
    let mut seen: HashSet<&str> = HashSet::with_capacity(mapping.len());
    for (key, body) in mapping {
        let name = key.as_str().ok_or(RuleError::NotAMapping)?;
        // serde_yaml rejects duplicate mapping keys on its own; this check
        // keeps the invariant local instead of relying on parser internals.
        if !seen.insert(name) {
            return Err(RuleError::DuplicateRule { rule: name.into() });
        }
        rules.push(parse_rule(name, body)?);
    }
    Ok(rules)
}

/// Parse a single rule file from a path.
pub fn parse_rules_file(path: &Path) -> Result<Vec<Rule>> {
    let content = std::fs::read_to_string(path).map_err(|e| RuleError::from(e).in_file(path))?;
    parse_rules_str(&content).map_err(|e| e.in_file(path))
}

// =============================================================================
// Rule body
// =============================================================================

fn parse_rule(name: &str, body: &Value) -> Result<Rule> {
    let m = body.as_mapping().ok_or_else(|| RuleError::InvalidRule {
        rule: name.into(),
        msg: "rule body must be a mapping".into(),
    })?;

    for key in m.keys() {
        let key_str = key.as_str().unwrap_or("");
        if !RULE_KEYS.contains(&key_str) {
            return Err(RuleError::InvalidRule {
                rule: name.into(),
                msg: format!("unknown key '{key_str}'"),
            });
        }
    }

    let layer_str = get_str(m, "layer").ok_or_else(|| RuleError::MissingKey {
        rule: name.into(),
        key: "layer".into(),
    })?;
    let layer: Layer = layer_str.parse().map_err(|_| RuleError::UnknownLayer {
        rule: name.into(),
        value: layer_str.into(),
    })?;

    let meta = parse_meta(m.get(val_key("meta")));
    let tags = parse_tags(name, m.get(val_key("tags")))?;
    let root = parse_match_root(name, layer, m.get(val_key("match")))?;

    if root.is_empty_group() {
        warn!(rule = name, %layer, "rule has an empty match section and will match every event of its layer");
    }

    Ok(Rule {
        name: name.into(),
        layer,
        meta,
        tags,
        root,
    })
}

/// Parse the free-form `meta` mapping. Non-mapping or malformed entries are
/// carried as stringified scalars rather than rejected; metadata never gates
/// a load.
fn parse_meta(value: Option<&Value>) -> BTreeMap<String, MetaValue> {
    let mut meta = BTreeMap::new();
    let Some(m) = value.and_then(Value::as_mapping) else {
        return meta;
    };
    for (key, val) in m {
        let Some(key) = key.as_str() else { continue };
        let entry = match val {
            Value::Sequence(seq) => MetaValue::Many(seq.iter().filter_map(scalar_str).collect()),
            other => match scalar_str(other) {
                Some(s) => MetaValue::One(s),
                None => continue,
            },
        };
        meta.insert(key.to_string(), entry);
    }
    meta
}

/// Parse static tags: `category → [value, ...]`. A bare scalar value is
/// accepted as a single-element list.
fn parse_tags(rule: &str, value: Option<&Value>) -> Result<Tags> {
    let mut tags = Tags::new();
    let Some(value) = value else {
        return Ok(tags);
    };
    let m = value.as_mapping().ok_or_else(|| RuleError::InvalidRule {
        rule: rule.into(),
        msg: "tags must be a mapping of category to values".into(),
    })?;
    for (key, val) in m {
        let category = key.as_str().ok_or_else(|| RuleError::InvalidRule {
            rule: rule.into(),
            msg: "tag categories must be strings".into(),
        })?;
        let values = string_list(val).ok_or_else(|| RuleError::InvalidRule {
            rule: rule.into(),
            msg: format!("tag category '{category}' must hold a value or list of values"),
        })?;
        tags.insert(category.to_string(), values);
    }
    Ok(tags)
}

// =============================================================================
// Match tree
// =============================================================================

/// Parse the `match` section into the root node. A missing or empty section
/// yields a match-all root (the caller warns).
fn parse_match_root(rule: &str, layer: Layer, value: Option<&Value>) -> Result<MatchNode> {
    let Some(value) = value else {
        return Ok(MatchNode::match_all());
    };
    if value.is_null() {
        return Ok(MatchNode::match_all());
    }
    let m = value.as_mapping().ok_or_else(|| RuleError::InvalidGroup {
        rule: rule.into(),
        msg: "match section must be a mapping".into(),
    })?;
    let children = parse_entries(rule, layer, m)?;
    Ok(normalize(MatchNode::Group {
        operator: GroupOp::And,
        negate: false,
        children,
    }))
}

/// Parse the entries of a mapping inside `match`: selector keys become
/// leaves, a `group` key opens a nested group. Entries are AND-linked by the
/// caller.
fn parse_entries(rule: &str, layer: Layer, m: &Mapping) -> Result<Vec<MatchNode>> {
    let mut children = Vec::with_capacity(m.len());
    for (key, val) in m {
        let key_str = key.as_str().ok_or_else(|| RuleError::InvalidGroup {
            rule: rule.into(),
            msg: "match keys must be strings".into(),
        })?;
        if key_str == "group" {
            children.push(parse_group(rule, layer, val)?);
        } else {
            children.push(parse_leaf(rule, layer, key_str, val)?);
        }
    }
    Ok(children)
}

/// Parse a `group` body: `{operator: and|or, matches: [...], negate: bool}`.
fn parse_group(rule: &str, layer: Layer, value: &Value) -> Result<MatchNode> {
    let m = value.as_mapping().ok_or_else(|| RuleError::InvalidGroup {
        rule: rule.into(),
        msg: "group body must be a mapping".into(),
    })?;

    for key in m.keys() {
        let key_str = key.as_str().unwrap_or("");
        if !matches!(key_str, "operator" | "matches" | "negate") {
            return Err(RuleError::InvalidGroup {
                rule: rule.into(),
                msg: format!("unknown group key '{key_str}'"),
            });
        }
    }

    let operator = match get_str(m, "operator") {
        Some("and") => GroupOp::And,
        Some("or") => GroupOp::Or,
        Some(other) => {
            return Err(RuleError::InvalidGroup {
                rule: rule.into(),
                msg: format!("unknown operator '{other}' (wanted: and, or)"),
            });
        }
        None => {
            return Err(RuleError::InvalidGroup {
                rule: rule.into(),
                msg: "group is missing 'operator'".into(),
            });
        }
    };

    let negate = match m.get(val_key("negate")) {
        None => false,
        Some(Value::Bool(b)) => *b,
        Some(_) => {
            return Err(RuleError::InvalidGroup {
                rule: rule.into(),
                msg: "'negate' must be a boolean".into(),
            });
        }
    };

    let matches = m
        .get(val_key("matches"))
        .and_then(Value::as_sequence)
        .ok_or_else(|| RuleError::InvalidGroup {
            rule: rule.into(),
            msg: "group is missing 'matches' (a list of children)".into(),
        })?;

    // Each list item is a mapping of entries; multiple entries in one item
    // are an implicit AND, same as the match root.
    let mut children = Vec::with_capacity(matches.len());
    for item in matches {
        let item_map = item.as_mapping().ok_or_else(|| RuleError::InvalidGroup {
            rule: rule.into(),
            msg: "group children must be mappings".into(),
        })?;
        let entries = parse_entries(rule, layer, item_map)?;
        children.push(normalize(MatchNode::Group {
            operator: GroupOp::And,
            negate: false,
            children: entries,
        }));
    }

    Ok(MatchNode::Group {
        operator,
        negate,
        children,
    })
}

/// Parse one leaf: resolve the selector against the layer's field set, then
/// decode the body into exactly one primitive plus options.
fn parse_leaf(rule: &str, layer: Layer, sel_path: &str, value: &Value) -> Result<MatchNode> {
    let selector = Selector::parse(sel_path).ok_or_else(|| RuleError::UnknownSelector {
        rule: rule.into(),
        selector: sel_path.into(),
    })?;
    if !selector.valid_for(layer) {
        return Err(RuleError::SelectorLayerMismatch {
            rule: rule.into(),
            selector: sel_path.into(),
            layer: layer.as_str().into(),
        });
    }

    let m = value.as_mapping().ok_or_else(|| {
        invalid_leaf(rule, sel_path, "leaf body must be a mapping of primitive to value")
    })?;

    let mut primitive: Option<(&str, &Value)> = None;
    for (key, val) in m {
        let key_str = key.as_str().unwrap_or("");
        if LEAF_OPTION_KEYS.contains(&key_str) {
            continue;
        }
        if !is_primitive_key(key_str) {
            return Err(invalid_leaf(
                rule,
                sel_path,
                &format!("unknown key '{key_str}'"),
            ));
        }
        if let Some((prev, _)) = primitive {
            return Err(invalid_leaf(
                rule,
                sel_path,
                &format!("ambiguous leaf: both '{prev}' and '{key_str}' given"),
            ));
        }
        primitive = Some((key_str, val));
    }
    let (prim_key, prim_val) =
        primitive.ok_or_else(|| invalid_leaf(rule, sel_path, "leaf has no match primitive"))?;

    let options = parse_leaf_options(rule, sel_path, m)?;
    let predicate = parse_predicate(rule, sel_path, prim_key, prim_val)?;

    Ok(MatchNode::Leaf(LeafMatch {
        selector,
        predicate,
        options,
    }))
}

fn is_primitive_key(key: &str) -> bool {
    matches!(
        key,
        "equals"
            | "contains"
            | "starts_with"
            | "ends_with"
            | "regex"
            | "in"
            | "eq"
            | "ne"
            | "gt"
            | "gte"
            | "lt"
            | "lte"
            | "pattern"
    )
}

fn parse_predicate(rule: &str, sel: &str, key: &str, value: &Value) -> Result<Predicate> {
    let needles = || {
        string_list(value).ok_or_else(|| {
            invalid_leaf(rule, sel, &format!("'{key}' wants a value or list of values"))
        })
    };
    let number = || {
        scalar_f64(value)
            .ok_or_else(|| invalid_leaf(rule, sel, &format!("'{key}' wants a numeric value")))
    };

    let predicate = match key {
        "equals" => Predicate::Equals(needles()?),
        "contains" => Predicate::Contains(needles()?),
        "starts_with" => Predicate::StartsWith(needles()?),
        "ends_with" => Predicate::EndsWith(needles()?),
        "regex" => Predicate::Regex(needles()?),
        "in" => Predicate::InSet(needles()?),
        "eq" => Predicate::Numeric { op: NumOp::Eq, value: number()? },
        "ne" => Predicate::Numeric { op: NumOp::Ne, value: number()? },
        "gt" => Predicate::Numeric { op: NumOp::Gt, value: number()? },
        "gte" => Predicate::Numeric { op: NumOp::Gte, value: number()? },
        "lt" => Predicate::Numeric { op: NumOp::Lt, value: number()? },
        "lte" => Predicate::Numeric { op: NumOp::Lte, value: number()? },
        "pattern" => {
            let pat = value.as_str().ok_or_else(|| {
                invalid_leaf(rule, sel, "'pattern' wants a hex byte string")
            })?;
            Predicate::BinaryPattern(pat.to_string())
        }
        _ => unreachable!("checked by is_primitive_key"),
    };

    if predicate.needles().is_some_and(<[String]>::is_empty) {
        return Err(invalid_leaf(rule, sel, &format!("'{key}' has no values")));
    }

    Ok(predicate)
}

fn parse_leaf_options(rule: &str, sel: &str, leaf: &Mapping) -> Result<LeafOptions> {
    let mut options = LeafOptions::default();

    match leaf.get(val_key("all")) {
        None => {}
        Some(Value::Bool(b)) => options.all = *b,
        Some(_) => return Err(invalid_leaf(rule, sel, "'all' must be a boolean")),
    }

    let Some(opts_val) = leaf.get(val_key("options")) else {
        return Ok(options);
    };
    let m = opts_val
        .as_mapping()
        .ok_or_else(|| invalid_leaf(rule, sel, "'options' must be a mapping"))?;

    for (key, val) in m {
        match key.as_str().unwrap_or("") {
            "case_insensitive" => {
                options.case_insensitive = val
                    .as_bool()
                    .ok_or_else(|| invalid_leaf(rule, sel, "'case_insensitive' must be a boolean"))?;
            }
            "decode" => {
                options.decode = match val.as_str() {
                    Some("none") => Decode::None,
                    Some("base64") => Decode::Base64,
                    Some("hex") => Decode::Hex,
                    Some("gzip") => Decode::Gzip,
                    _ => {
                        return Err(invalid_leaf(
                            rule,
                            sel,
                            "'decode' must be one of: none, base64, hex, gzip",
                        ));
                    }
                };
            }
            "encoding" => {
                options.encoding = match val.as_str() {
                    Some("none") => NeedleEncoding::None,
                    Some("base64") => NeedleEncoding::Base64,
                    Some("hex") => NeedleEncoding::Hex,
                    _ => {
                        return Err(invalid_leaf(
                            rule,
                            sel,
                            "'encoding' must be one of: none, base64, hex",
                        ));
                    }
                };
            }
            other => {
                return Err(invalid_leaf(rule, sel, &format!("unknown option '{other}'")));
            }
        }
    }

    Ok(options)
}

fn invalid_leaf(rule: &str, selector: &str, msg: &str) -> RuleError {
    RuleError::InvalidLeaf {
        rule: rule.into(),
        selector: selector.into(),
        msg: msg.into(),
    }
}

/// Collapse redundant unary groups: a non-negated group with one child is
/// its child.
fn normalize(node: MatchNode) -> MatchNode {
    match node {
        MatchNode::Group {
            operator,
            negate,
            children,
        } => {
            let mut children: Vec<MatchNode> = children.into_iter().map(normalize).collect();
            if children.len() == 1 && !negate {
                children.pop().unwrap_or(MatchNode::match_all())
            } else {
                MatchNode::Group {
                    operator,
                    negate,
                    children,
                }
            }
        }
        leaf => leaf,
    }
}

// =============================================================================
// YAML helpers
// =============================================================================

fn val_key(s: &str) -> Value {
    Value::String(s.to_string())
}

fn get_str<'a>(m: &'a Mapping, key: &str) -> Option<&'a str> {
    m.get(val_key(key)).and_then(Value::as_str)
}

/// A scalar or a list of scalars, stringified. Numbers and booleans are
/// rendered so values like `port.dst: {in: [80, 443]}` read naturally.
fn string_list(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Sequence(seq) => {
            let mut out = Vec::with_capacity(seq.len());
            for v in seq {
                out.push(scalar_str(v)?);
            }
            Some(out)
        }
        other => Some(vec![scalar_str(other)?]),
    }
}

fn scalar_str(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn scalar_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

// =============================================================================
// Tests
// =============================================================================
