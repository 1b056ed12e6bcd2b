//! The rule evaluation engine.
//!
//! The `Engine` owns the compiled per-layer rule store. It is immutable
//! after construction, so evaluator threads share it behind an `Arc` with
//! lock-free reads; a rule-set reload builds a fresh engine and swaps the
//! handle.
//!
//! Evaluation is fail-open: a rule that exceeds its time budget is logged
//! and treated as a non-match, and never silences the remaining rules.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::warn;

use nectar_rules::{Decode, GroupOp, Layer, RuleIndex};

use crate::compiler::{CompiledNode, CompiledRule, compile_rule};
use crate::error::Result;
use crate::event::{Event, FieldRef};
use crate::matcher::Scratch;
use crate::payload::decode_field;

/// Decoded field buffers are capped so a hostile payload cannot balloon the
/// evaluator's scratch space.
const MAX_DECODED_BYTES: usize = 1 << 20;

/// Engine construction options, derived from sensor configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineOptions {
    /// Best-effort per-rule evaluation budget. Exceedance is a warned
    /// non-match.
    pub rule_budget: Option<Duration>,
}

/// Compiled rules indexed by layer.
#[derive(Debug)]
pub struct Engine {
    by_layer: HashMap<Layer, Vec<CompiledRule>>,
    budget: Option<Duration>,
}

impl Engine {
    /// Compile a loaded rule index. Fails closed on the first rule that
    /// cannot compile.
    pub fn new(index: &RuleIndex, options: EngineOptions) -> Result<Engine> {
        let mut by_layer = HashMap::new();
        for layer in Layer::ALL {
            let rules = index.rules_for(layer);
            if rules.is_empty() {
                continue;
            }
            let compiled: Result<Vec<_>> = rules.iter().map(compile_rule).collect();
            by_layer.insert(layer, compiled?);
        }
        Ok(Engine {
            by_layer,
            budget: options.rule_budget,
        })
    }

    /// Total number of compiled rules.
    pub fn rule_count(&self) -> usize {
        self.by_layer.values().map(Vec::len).sum()
    }

    /// Compiled rules of one layer, in load order.
    pub fn rules_for(&self, layer: Layer) -> &[CompiledRule] {
        self.by_layer.get(&layer).map_or(&[], Vec::as_slice)
    }

    /// Evaluate every rule of the event's layer, attaching tags in load
    /// order. Only `tags` is touched; all other event fields are preserved
    /// bit-identical. Re-running over an already-tagged event is a no-op
    /// for the rules it has recorded.
    pub fn evaluate(&self, event: &mut Event) {
        let Some(rules) = self.by_layer.get(&event.kind.layer()) else {
            return;
        };
        let mut scratch = Scratch::default();
        for rule in rules {
            if event.has_rule(&rule.name) {
                continue;
            }
            let started = Instant::now();
            let matched = eval_node(&rule.root, event, &mut scratch);
            if let Some(budget) = self.budget {
                let elapsed = started.elapsed();
                if elapsed > budget {
                    warn!(
                        rule = %rule.name,
                        elapsed_us = elapsed.as_micros() as u64,
                        "rule evaluation exceeded its budget; treated as non-match"
                    );
                    continue;
                }
            }
            if matched {
                event.attach_match(&rule.name, &rule.tags);
            }
        }
    }
}

/// Depth-first, short-circuit evaluation of a compiled node.
fn eval_node(node: &CompiledNode, event: &Event, scratch: &mut Scratch) -> bool {
    match node {
        CompiledNode::Group {
            operator,
            negate,
            children,
        } => {
            let result = match operator {
                // An empty AND group is the documented catch-all root.
                GroupOp::And => children.iter().all(|c| eval_node(c, event, scratch)),
                GroupOp::Or => children.iter().any(|c| eval_node(c, event, scratch)),
            };
            result ^ negate
        }
        CompiledNode::Leaf {
            selector,
            decode,
            matcher,
        } => {
            let field = event.field(selector);
            if *decode == Decode::None {
                return matcher.matches(&field, scratch);
            }
            // Decode the field into the scratch buffer first; only textual
            // or byte fields are decodable, and a decode failure is a
            // defined non-match.
            let input = match field {
                FieldRef::Bytes(b) => b,
                FieldRef::Str(s) => s.as_bytes(),
                _ => return false,
            };
            let mut buf = std::mem::take(&mut scratch.decode);
            let ok = decode_field(*decode, input, &mut buf, MAX_DECODED_BYTES);
            let matched = ok && matcher.matches(&FieldRef::Bytes(&buf), scratch);
            scratch.decode = buf;
            matched
        }
    }
}
