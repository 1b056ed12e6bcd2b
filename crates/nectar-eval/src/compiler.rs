//! Compile parsed rules into their evaluable in-memory form.
//!
//! The compiler turns the `nectar-rules` AST into [`CompiledRule`] trees:
//! regexes are built, `in` literals hashed, encoded needle literals decoded,
//! and binary patterns parsed. Everything here is load-time and fail-closed;
//! a rule that cannot compile rejects the whole startup.

use std::collections::{BTreeMap, HashSet};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use regex::bytes::RegexBuilder;

use nectar_rules::{
    Decode, GroupOp, Layer, LeafMatch, LeafOptions, MatchNode, MetaValue, NeedleEncoding,
    Predicate, Rule, Selector, Tags,
};

use crate::error::{EvalError, Result};
use crate::matcher::CompiledMatcher;

/// Guard against pathological patterns; generous for rule-file regexes.
const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// A rule compiled for evaluation, immutable once built.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub name: String,
    pub layer: Layer,
    pub tags: Tags,
    pub meta: BTreeMap<String, MetaValue>,
    pub root: CompiledNode,
}

/// A compiled matcher-tree node.
#[derive(Debug, Clone)]
pub enum CompiledNode {
    Group {
        operator: GroupOp,
        negate: bool,
        children: Vec<CompiledNode>,
    },
    Leaf {
        selector: Selector,
        decode: Decode,
        matcher: CompiledMatcher,
    },
}

/// Compile one parsed rule.
pub fn compile_rule(rule: &Rule) -> Result<CompiledRule> {
    Ok(CompiledRule {
        name: rule.name.clone(),
        layer: rule.layer,
        tags: rule.tags.clone(),
        meta: rule.meta.clone(),
        root: compile_node(&rule.name, &rule.root)?,
    })
}

fn compile_node(rule: &str, node: &MatchNode) -> Result<CompiledNode> {
    match node {
        MatchNode::Group {
            operator,
            negate,
            children,
        } => {
            let compiled: Result<Vec<_>> =
                children.iter().map(|c| compile_node(rule, c)).collect();
            Ok(CompiledNode::Group {
                operator: *operator,
                negate: *negate,
                children: compiled?,
            })
        }
        MatchNode::Leaf(leaf) => compile_leaf(rule, leaf),
    }
}

fn compile_leaf(rule: &str, leaf: &LeafMatch) -> Result<CompiledNode> {
    let opts = &leaf.options;
    let matcher = match &leaf.predicate {
        Predicate::Equals(lits) => CompiledMatcher::Equals {
            needles: compile_needles(rule, lits, opts)?,
            ci: opts.case_insensitive,
            all: opts.all,
        },
        Predicate::Contains(lits) => CompiledMatcher::Contains {
            needles: compile_needles(rule, lits, opts)?,
            ci: opts.case_insensitive,
            all: opts.all,
        },
        Predicate::StartsWith(lits) => CompiledMatcher::StartsWith {
            needles: compile_needles(rule, lits, opts)?,
            ci: opts.case_insensitive,
            all: opts.all,
        },
        Predicate::EndsWith(lits) => CompiledMatcher::EndsWith {
            needles: compile_needles(rule, lits, opts)?,
            ci: opts.case_insensitive,
            all: opts.all,
        },
        Predicate::InSet(lits) => {
            let needles = compile_needles(rule, lits, opts)?;
            let set: HashSet<Vec<u8>> = if opts.case_insensitive {
                needles
                    .into_iter()
                    .map(|n| n.to_ascii_lowercase())
                    .collect()
            } else {
                needles.into_iter().collect()
            };
            CompiledMatcher::InSet {
                set,
                ci: opts.case_insensitive,
            }
        }
        Predicate::Regex(patterns) => {
            if opts.encoding != NeedleEncoding::None {
                return Err(EvalError::IncompatibleOptions {
                    rule: rule.into(),
                    msg: "'encoding' cannot apply to regex patterns".into(),
                });
            }
            let compiled: Result<Vec<_>> = patterns
                .iter()
                .map(|p| {
                    RegexBuilder::new(p)
                        .case_insensitive(opts.case_insensitive)
                        .size_limit(REGEX_SIZE_LIMIT)
                        .build()
                        .map_err(|e| EvalError::InvalidRegex {
                            rule: rule.into(),
                            source: Box::new(e),
                        })
                })
                .collect();
            CompiledMatcher::Regex {
                patterns: compiled?,
                all: opts.all,
            }
        }
        Predicate::Numeric { op, value } => CompiledMatcher::Numeric {
            op: *op,
            value: *value,
        },
        Predicate::BinaryPattern(text) => CompiledMatcher::Binary {
            pattern: parse_binary_pattern(rule, text)?,
        },
    };

    Ok(CompiledNode::Leaf {
        selector: leaf.selector.clone(),
        decode: opts.decode,
        matcher,
    })
}

/// Needle literals as bytes, decoding `options.encoding` fail-closed. The
/// case-insensitive pre-fold happens here so match time only folds the
/// haystack.
fn compile_needles(rule: &str, lits: &[String], opts: &LeafOptions) -> Result<Vec<Vec<u8>>> {
    let mut needles = Vec::with_capacity(lits.len());
    for lit in lits {
        let mut bytes = match opts.encoding {
            NeedleEncoding::None => lit.clone().into_bytes(),
            NeedleEncoding::Base64 => {
                BASE64
                    .decode(lit.trim())
                    .map_err(|e| EvalError::InvalidNeedle {
                        rule: rule.into(),
                        msg: format!("'{lit}' is not valid base64: {e}"),
                    })?
            }
            NeedleEncoding::Hex => hex::decode(lit.trim()).map_err(|e| EvalError::InvalidNeedle {
                rule: rule.into(),
                msg: format!("'{lit}' is not valid hex: {e}"),
            })?,
        };
        if opts.case_insensitive {
            bytes.make_ascii_lowercase();
        }
        needles.push(bytes);
    }
    Ok(needles)
}

/// Parse a hex byte pattern like `"de ad ?? ef"`. Whitespace is cosmetic;
/// `??` is a single-byte wildcard.
fn parse_binary_pattern(rule: &str, text: &str) -> Result<Vec<Option<u8>>> {
    let compact: Vec<u8> = text
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if compact.is_empty() {
        return Err(EvalError::InvalidPattern {
            rule: rule.into(),
            msg: "pattern is empty".into(),
        });
    }
    if compact.len() % 2 != 0 {
        return Err(EvalError::InvalidPattern {
            rule: rule.into(),
            msg: "pattern has an odd number of hex digits".into(),
        });
    }

    let mut pattern = Vec::with_capacity(compact.len() / 2);
    for pair in compact.chunks_exact(2) {
        if pair == b"??" {
            pattern.push(None);
            continue;
        }
        let hi = hex_digit(pair[0]);
        let lo = hex_digit(pair[1]);
        match (hi, lo) {
            (Some(hi), Some(lo)) => pattern.push(Some(hi << 4 | lo)),
            _ => {
                return Err(EvalError::InvalidPattern {
                    rule: rule.into(),
                    msg: format!(
                        "invalid token '{}' (wanted a hex pair or ??)",
                        String::from_utf8_lossy(pair)
                    ),
                });
            }
        }
    }
    Ok(pattern)
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nectar_rules::parse_rules_str;

    fn compile_one(yaml: &str) -> Result<CompiledRule> {
        let rules = parse_rules_str(yaml).unwrap();
        compile_rule(&rules[0])
    }

    #[test]
    fn compiles_a_simple_rule() {
        let rule = compile_one(
            r#"
ua:
  layer: http
  tags:
    tool: [sqlmap]
  match:
    http.headers.user-agent:
      contains: ["sqlmap"]
      options: { case_insensitive: true }
"#,
        )
        .unwrap();
        assert_eq!(rule.name, "ua");
        let CompiledNode::Leaf { matcher, .. } = &rule.root else {
            panic!()
        };
        let CompiledMatcher::Contains { needles, ci, .. } = matcher else {
            panic!()
        };
        assert!(*ci);
        // Needles are pre-folded for case-insensitive matching.
        assert_eq!(needles[0], b"sqlmap");
    }

    #[test]
    fn bad_regex_fails_closed() {
        let err = compile_one(
            "r:\n  layer: http\n  match:\n    http.uri: { regex: \"([unclosed\" }\n",
        )
        .unwrap_err();
        assert!(matches!(err, EvalError::InvalidRegex { .. }));
    }

    #[test]
    fn encoded_needles_are_predecoded() {
        let rule = compile_one(
            r#"
b64:
  layer: http
  match:
    http.body:
      contains: ["PD9waHA="]
      options: { encoding: base64 }
"#,
        )
        .unwrap();
        let CompiledNode::Leaf { matcher, .. } = &rule.root else {
            panic!()
        };
        let CompiledMatcher::Contains { needles, .. } = matcher else {
            panic!()
        };
        assert_eq!(needles[0], b"<?php");
    }

    #[test]
    fn bad_encoded_needle_fails_closed() {
        let err = compile_one(
            r#"
bad:
  layer: http
  match:
    http.body:
      contains: ["!!!"]
      options: { encoding: base64 }
"#,
        )
        .unwrap_err();
        assert!(matches!(err, EvalError::InvalidNeedle { .. }));
    }

    #[test]
    fn encoding_on_regex_is_rejected() {
        let err = compile_one(
            r#"
bad:
  layer: http
  match:
    http.uri:
      regex: ["^/admin"]
      options: { encoding: hex }
"#,
        )
        .unwrap_err();
        assert!(matches!(err, EvalError::IncompatibleOptions { .. }));
    }

    #[test]
    fn binary_pattern_parsing() {
        assert_eq!(
            parse_binary_pattern("r", "de ad ?? ef").unwrap(),
            vec![Some(0xde), Some(0xad), None, Some(0xef)]
        );
        assert_eq!(
            parse_binary_pattern("r", "DEADBEEF").unwrap(),
            vec![Some(0xde), Some(0xad), Some(0xbe), Some(0xef)]
        );
        assert!(parse_binary_pattern("r", "dea").is_err());
        assert!(parse_binary_pattern("r", "zz").is_err());
        assert!(parse_binary_pattern("r", "").is_err());
    }

    #[test]
    fn in_set_is_hashed_and_folded() {
        let rule = compile_one(
            r#"
set:
  layer: tcp
  match:
    tcp.flags:
      in: ["S", "SA"]
      options: { case_insensitive: true }
"#,
        )
        .unwrap();
        let CompiledNode::Leaf { matcher, .. } = &rule.root else {
            panic!()
        };
        let CompiledMatcher::InSet { set, ci } = matcher else {
            panic!()
        };
        assert!(*ci);
        assert!(set.contains("s".as_bytes()));
        assert!(set.contains("sa".as_bytes()));
    }
}
