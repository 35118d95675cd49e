//! The pattern tree matched against data values.

use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;

/// A host predicate applied to the value at the current match position.
/// A `true` return is a match.
pub type PredicateFn = fn(&Value) -> bool;

/// A declarative pattern over JSON-shaped data.
///
/// Object keys are interpreted at evaluation time as registered operator
/// names, registered aggregator names (directly under an array-typed
/// pattern), reserved engine directives, or data field names. Matching an
/// object node is conjunctive: every key must succeed. Keys are visited in
/// insertion order, which is observable through capture-key collisions
/// (last write wins).
#[derive(Clone)]
pub enum Pattern {
    /// A literal value, matched by loose JSON equality.
    Literal(Value),
    /// A conjunctive map of operator names and nested field patterns.
    Object(IndexMap<String, Pattern>),
    /// A host predicate on the value at the current position.
    Predicate(PredicateFn),
}

impl Pattern {
    /// Builds an object pattern from `(key, pattern)` pairs, preserving
    /// insertion order.
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Pattern)>,
    {
        Pattern::Object(
            entries
                .into_iter()
                .map(|(k, p)| (k.into(), p))
                .collect(),
        )
    }

    pub fn predicate(f: PredicateFn) -> Self {
        Pattern::Predicate(f)
    }
}

impl From<Value> for Pattern {
    /// Lifts a JSON value into a pattern: object nodes become conjunctive
    /// `Object` patterns recursively, everything else is a `Literal`.
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Pattern::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Pattern::from(v)))
                    .collect(),
            ),
            other => Pattern::Literal(other),
        }
    }
}

impl From<&Value> for Pattern {
    fn from(value: &Value) -> Self {
        Pattern::from(value.clone())
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Literal(v) => write!(f, "Literal({})", v),
            Pattern::Object(map) => f.debug_map().entries(map.iter()).finish(),
            Pattern::Predicate(_) => write!(f, "Predicate(..)"),
        }
    }
}
