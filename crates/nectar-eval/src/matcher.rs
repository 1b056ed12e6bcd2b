//! Compiled matchers for zero-surprise hot-path evaluation.
//!
//! Each `CompiledMatcher` variant is pre-compiled at rule load time: regexes
//! built, set literals hashed, needles pre-folded for case-insensitive
//! comparison. At evaluation time `matches()` runs against a borrowed field
//! value; reusable buffers live in the caller's [`Scratch`].

use std::collections::HashSet;

use regex::bytes::Regex;

use nectar_rules::NumOp;

use crate::event::FieldRef;

/// Reusable per-event buffers owned by the evaluator.
///
/// `decode` holds decoded field bytes, `fold` a lowercased haystack, `num`
/// the rendering of numeric fields. Matchers borrow into these instead of
/// allocating per leaf.
#[derive(Debug, Default)]
pub struct Scratch {
    pub decode: Vec<u8>,
    pub fold: Vec<u8>,
    pub num: String,
}

/// A pre-compiled leaf matcher.
///
/// String matchers store needles lowercased when `ci` is set; the haystack
/// is folded (or compared with `eq_ignore_ascii_case`) at match time. ASCII
/// folding only, by design of the rule language.
#[derive(Debug, Clone)]
pub enum CompiledMatcher {
    Equals {
        needles: Vec<Vec<u8>>,
        ci: bool,
        all: bool,
    },
    Contains {
        needles: Vec<Vec<u8>>,
        ci: bool,
        all: bool,
    },
    StartsWith {
        needles: Vec<Vec<u8>>,
        ci: bool,
        all: bool,
    },
    EndsWith {
        needles: Vec<Vec<u8>>,
        ci: bool,
        all: bool,
    },
    /// Compiled patterns; case-insensitivity is baked into the regex.
    Regex { patterns: Vec<Regex>, all: bool },
    /// O(1) membership in a pre-hashed set.
    InSet { set: HashSet<Vec<u8>>, ci: bool },
    /// Numeric comparison; a field that does not parse is a non-match.
    Numeric { op: NumOp, value: f64 },
    /// Fixed-length byte pattern, `None` entries are single-byte wildcards.
    /// Matches on any occurrence.
    Binary { pattern: Vec<Option<u8>> },
}

impl CompiledMatcher {
    /// Evaluate against a resolved field value. `Missing` never matches.
    pub fn matches(&self, field: &FieldRef<'_>, scratch: &mut Scratch) -> bool {
        if matches!(field, FieldRef::Missing) {
            return false;
        }

        match self {
            CompiledMatcher::Numeric { op, value } => match field_f64(field) {
                Some(n) => numeric_cmp(*op, n, *value),
                None => false,
            },

            CompiledMatcher::Equals { needles, ci, all } => {
                with_bytes(field, scratch, |hay| {
                    over(needles, *all, |n| {
                        if *ci {
                            hay.eq_ignore_ascii_case(n)
                        } else {
                            hay == n.as_slice()
                        }
                    })
                })
            }

            CompiledMatcher::StartsWith { needles, ci, all } => {
                with_bytes(field, scratch, |hay| {
                    over(needles, *all, |n| {
                        if *ci {
                            hay.len() >= n.len() && hay[..n.len()].eq_ignore_ascii_case(n)
                        } else {
                            hay.starts_with(n)
                        }
                    })
                })
            }

            CompiledMatcher::EndsWith { needles, ci, all } => {
                with_bytes(field, scratch, |hay| {
                    over(needles, *all, |n| {
                        if *ci {
                            hay.len() >= n.len()
                                && hay[hay.len() - n.len()..].eq_ignore_ascii_case(n)
                        } else {
                            hay.ends_with(n)
                        }
                    })
                })
            }

            CompiledMatcher::Contains { needles, ci, all } => {
                let Scratch { fold, num, .. } = scratch;
                let hay = match raw_bytes(field, num) {
                    Some(b) => b,
                    None => return false,
                };
                if *ci {
                    fold_into(hay, fold);
                    over(needles, *all, |n| find_subslice(fold, n))
                } else {
                    over(needles, *all, |n| find_subslice(hay, n))
                }
            }

            CompiledMatcher::Regex { patterns, all } => with_bytes(field, scratch, |hay| {
                if *all {
                    patterns.iter().all(|re| re.is_match(hay))
                } else {
                    patterns.iter().any(|re| re.is_match(hay))
                }
            }),

            CompiledMatcher::InSet { set, ci } => {
                let Scratch { fold, num, .. } = scratch;
                let hay = match raw_bytes(field, num) {
                    Some(b) => b,
                    None => return false,
                };
                if *ci {
                    fold_into(hay, fold);
                    set.contains(fold.as_slice())
                } else {
                    set.contains(hay)
                }
            }

            CompiledMatcher::Binary { pattern } => with_bytes(field, scratch, |hay| {
                scan_pattern(hay, pattern)
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

/// Combine per-needle results: `all` links with AND, the default with OR.
fn over(needles: &[Vec<u8>], all: bool, pred: impl Fn(&Vec<u8>) -> bool) -> bool {
    if all {
        needles.iter().all(pred)
    } else {
        needles.iter().any(pred)
    }
}

/// The byte view of a field. Numeric and boolean fields coerce to their
/// textual form so rules like `port.dst: {equals: "80"}` read naturally.
fn raw_bytes<'a>(field: &FieldRef<'a>, num: &'a mut String) -> Option<&'a [u8]> {
    match field {
        FieldRef::Bytes(b) => Some(b),
        FieldRef::Str(s) => Some(s.as_bytes()),
        FieldRef::Bool(b) => Some(if *b { b"true" } else { b"false" }),
        FieldRef::UInt(n) => {
            use std::fmt::Write;
            num.clear();
            let _ = write!(num, "{n}");
            Some(num.as_bytes())
        }
        FieldRef::Missing => None,
    }
}

fn with_bytes(
    field: &FieldRef<'_>,
    scratch: &mut Scratch,
    pred: impl FnOnce(&[u8]) -> bool,
) -> bool {
    let Scratch { num, .. } = scratch;
    match raw_bytes(field, num) {
        Some(bytes) => pred(bytes),
        None => false,
    }
}

/// ASCII-lowercase `input` into `out`.
fn fold_into(input: &[u8], out: &mut Vec<u8>) {
    out.clear();
    out.extend(input.iter().map(u8::to_ascii_lowercase));
}

/// Substring search over raw bytes.
fn find_subslice(hay: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    if needle.len() > hay.len() {
        return false;
    }
    hay.windows(needle.len()).any(|w| w == needle)
}

/// Scan for any occurrence of a wildcard byte pattern.
fn scan_pattern(hay: &[u8], pattern: &[Option<u8>]) -> bool {
    if pattern.is_empty() {
        return true;
    }
    if pattern.len() > hay.len() {
        return false;
    }
    hay.windows(pattern.len()).any(|w| {
        w.iter()
            .zip(pattern)
            .all(|(b, p)| p.is_none_or(|expect| *b == expect))
    })
}

fn numeric_cmp(op: NumOp, field: f64, value: f64) -> bool {
    match op {
        NumOp::Eq => (field - value).abs() < f64::EPSILON,
        NumOp::Ne => (field - value).abs() >= f64::EPSILON,
        NumOp::Gt => field > value,
        NumOp::Gte => field >= value,
        NumOp::Lt => field < value,
        NumOp::Lte => field <= value,
    }
}

/// Numeric view of a field: integers directly, strings parsed. Parse
/// failure yields `None` (non-match).
fn field_f64(field: &FieldRef<'_>) -> Option<f64> {
    match field {
        FieldRef::UInt(n) => Some(*n as f64),
        FieldRef::Str(s) => s.trim().parse().ok(),
        FieldRef::Bytes(b) => std::str::from_utf8(b).ok()?.trim().parse().ok(),
        FieldRef::Bool(_) | FieldRef::Missing => None,
    }
}
