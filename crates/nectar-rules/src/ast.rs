//! AST types for nectar rules: layers, match trees, leaf predicates, and
//! per-leaf options.
//!
//! The AST is the normalized form of the YAML surface syntax: every leaf is
//! a canonical `LeafMatch`, unary groups are collapsed, and selectors are
//! resolved to the static [`Selector`](crate::selector::Selector) set.
//! Patterns stay as raw text here; compilation into matchers happens in
//! `nectar-eval`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::selector::Selector;

// =============================================================================
// Layers
// =============================================================================

/// The protocol layer a rule applies to.
///
/// ICMP rules cover both ICMPv4 and ICMPv6 events; the event model keeps the
/// two kinds distinct and maps both onto [`Layer::Icmp`] for rule lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Http,
    Https,
    Tcp,
    Udp,
    Icmp,
}

impl Layer {
    /// All layers, in the order rule indexes report them.
    pub const ALL: [Layer; 5] = [Layer::Http, Layer::Https, Layer::Tcp, Layer::Udp, Layer::Icmp];

    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Http => "http",
            Layer::Https => "https",
            Layer::Tcp => "tcp",
            Layer::Udp => "udp",
            Layer::Icmp => "icmp",
        }
    }
}

impl FromStr for Layer {
    type Err = ();
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "http" => Ok(Layer::Http),
            "https" => Ok(Layer::Https),
            "tcp" => Ok(Layer::Tcp),
            "udp" => Ok(Layer::Udp),
            "icmp" => Ok(Layer::Icmp),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Tags and metadata
// =============================================================================

/// Tag categories mapped to ordered value lists.
///
/// The same shape is used for a rule's static tags and for the tags attached
/// to an event during evaluation.
pub type Tags = BTreeMap<String, Vec<String>>;

/// A free-form metadata value: a scalar or a list of scalars.
///
/// Carried through verbatim from the rule file to match metadata (author,
/// description, references, ...).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetaValue {
    One(String),
    Many(Vec<String>),
}

// =============================================================================
// Match tree
// =============================================================================

/// Boolean operator of a match group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupOp {
    And,
    Or,
}

/// A node of a rule's matcher tree: either a nested group or a leaf.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MatchNode {
    /// AND/OR over child nodes, optionally negated.
    Group {
        operator: GroupOp,
        negate: bool,
        children: Vec<MatchNode>,
    },
    /// A single field predicate.
    Leaf(LeafMatch),
}

impl MatchNode {
    /// An AND group with no children. Matches every event of the rule's
    /// layer; the loader warns when a rule ends up with this root.
    pub fn match_all() -> Self {
        MatchNode::Group {
            operator: GroupOp::And,
            negate: false,
            children: Vec::new(),
        }
    }

    /// Returns `true` for a group with no children.
    pub fn is_empty_group(&self) -> bool {
        matches!(self, MatchNode::Group { children, .. } if children.is_empty())
    }
}

/// A canonical leaf: one selector, one predicate, and its options.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeafMatch {
    pub selector: Selector,
    pub predicate: Predicate,
    pub options: LeafOptions,
}

/// Comparison operator of a numeric predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NumOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl NumOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            NumOp::Eq => "eq",
            NumOp::Ne => "ne",
            NumOp::Gt => "gt",
            NumOp::Gte => "gte",
            NumOp::Lt => "lt",
            NumOp::Lte => "lte",
        }
    }
}

/// A leaf predicate as written in the rule file.
///
/// String primitives carry one or more needle literals; multiple needles are
/// OR-linked unless the leaf sets `all: true`. Regex patterns and binary
/// patterns stay textual here and are compiled fail-closed by the evaluator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    Equals(Vec<String>),
    Contains(Vec<String>),
    StartsWith(Vec<String>),
    EndsWith(Vec<String>),
    Regex(Vec<String>),
    /// O(1) membership in a pre-hashed set.
    InSet(Vec<String>),
    Numeric {
        op: NumOp,
        value: f64,
    },
    /// Hex byte pattern with `??` single-byte wildcards, e.g. `"de ad ?? ef"`.
    BinaryPattern(String),
}

impl Predicate {
    /// Needle literals of a string primitive, if this is one.
    pub fn needles(&self) -> Option<&[String]> {
        match self {
            Predicate::Equals(n)
            | Predicate::Contains(n)
            | Predicate::StartsWith(n)
            | Predicate::EndsWith(n)
            | Predicate::InSet(n) => Some(n),
            _ => None,
        }
    }
}

/// Field decoding applied to the selected value before matching.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Decode {
    #[default]
    None,
    Base64,
    Hex,
    Gzip,
}

/// Encoding of the needle literals themselves.
///
/// Encoded needles are pre-decoded at compile time so binary content can be
/// written as base64 or hex in the rule file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NeedleEncoding {
    #[default]
    None,
    Base64,
    Hex,
}

/// Options of a single leaf.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LeafOptions {
    /// ASCII case folding of both sides before comparison.
    pub case_insensitive: bool,
    /// Decode the field value before matching; decode failure is a non-match.
    pub decode: Decode,
    /// Decode needle literals at load time (fail-closed).
    pub encoding: NeedleEncoding,
    /// AND-link multiple needles instead of the default OR.
    pub all: bool,
}

// =============================================================================
// Rules
// =============================================================================

/// A named declarative matcher with static tags and free-form metadata.
///
/// Rules are built by the loader at startup and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rule {
    /// Unique within its source file.
    pub name: String,
    pub layer: Layer,
    /// Free-form metadata carried through to match output.
    pub meta: BTreeMap<String, MetaValue>,
    /// Static tags attached to any matched event.
    pub tags: Tags,
    /// Root of the matcher tree.
    pub root: MatchNode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_round_trip() {
        for layer in Layer::ALL {
            assert_eq!(layer.as_str().parse::<Layer>(), Ok(layer));
        }
        assert!("ethernet".parse::<Layer>().is_err());
    }

    #[test]
    fn empty_group_is_match_all() {
        let root = MatchNode::match_all();
        assert!(root.is_empty_group());
        let leaf = MatchNode::Group {
            operator: GroupOp::Or,
            negate: false,
            children: vec![MatchNode::match_all()],
        };
        assert!(!leaf.is_empty_group());
    }
}
