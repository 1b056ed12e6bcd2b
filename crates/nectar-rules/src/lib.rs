//! # nectar-rules
//!
//! Rule surface for the nectar passive network sensor.
//!
//! This crate parses nectar's declarative YAML rule files into a
//! strongly-typed AST, handling:
//!
//! - **Match trees**: per-field leaf matchers composed into nested AND/OR
//!   groups with optional negation
//! - **Match primitives**: `equals`, `contains`, `starts_with`, `ends_with`,
//!   `regex`, `in`, numeric comparisons, and binary byte patterns
//! - **Leaf options**: ASCII case folding, field decoding (`base64`, `hex`,
//!   `gzip`), encoded needle literals, and `all` value linking
//! - **Selectors**: field paths like `http.headers.user-agent` or
//!   `tcp.payload`, resolved at load time to a static per-layer field set
//! - **Directory loading**: a recursively-walked rules root, partitioned into
//!   a per-layer index
//!
//! Parsing is fail-closed: a syntax error, unknown selector, ambiguous leaf
//! shape, or duplicate rule name rejects the whole rule set. Pattern and
//! regex compilation happens downstream in `nectar-eval`.
//!
//! ## Quick Start
//!
//! ```rust
//! use nectar_rules::parse_rules_str;
//!
//! let yaml = r#"
//! scanner_ua:
//!   layer: http
//!   meta:
//!     description: Common scanner user agents
//!   tags:
//!     tool: [scanner]
//!   match:
//!     http.headers.user-agent:
//!       contains:
//!         - "sqlmap"
//!         - "nikto"
//!       options: { case_insensitive: true }
//! "#;
//!
//! let rules = parse_rules_str(yaml).unwrap();
//! assert_eq!(rules.len(), 1);
//! assert_eq!(rules[0].name, "scanner_ua");
//! ```

pub mod ast;
pub mod error;
pub mod loader;
pub mod parser;
pub mod selector;

// Re-export the most commonly used types and functions at crate root
pub use ast::{
    Decode, GroupOp, Layer, LeafMatch, LeafOptions, MatchNode, MetaValue, NeedleEncoding, NumOp,
    Predicate, Rule, Tags,
};
pub use error::{Result, RuleError};
pub use loader::{RULE_EXT, RuleIndex, load_dir};
pub use parser::{parse_rules_file, parse_rules_str};
pub use selector::Selector;
