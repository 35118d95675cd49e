//! A declarative structural pattern-matching engine for JSON-shaped values.
//!
//! Given a tree-shaped [`Pattern`] and a `serde_json::Value`, the engine
//! decides whether the data satisfies the pattern and, on success, produces
//! the named [`Bindings`] captured along the way. Object-pattern keys name
//! either data fields, registered operators (applied to the value at the
//! current position), or — directly under an array-typed pattern —
//! registered aggregators applied to the whole array. Matching is
//! conjunctive, evaluation is pure, synchronous recursive descent with no
//! depth bound; callers with hostile inputs must impose their own limits.
//!
//! ```
//! use jmatch::{Options, Pattern, evaluate};
//! use serde_json::json;
//!
//! let pattern = Pattern::from(json!({
//!     "order": {
//!         "total": { "$gte": 100 },
//!         "id": { "$capture": "order_id" }
//!     }
//! }));
//! let data = json!({ "order": { "total": 250, "id": "A-17" } });
//!
//! let bindings = evaluate(&pattern, &data, &Options::default())
//!     .unwrap()
//!     .expect("pattern matches");
//! assert_eq!(bindings["order_id"], json!("A-17"));
//! ```

pub mod engine;
pub mod error;
pub mod functions;
pub mod path;
pub mod pattern;

// --- Public API ---
pub use engine::{ALIAS_KEY, ARGS_KEY, Bindings, FIRST_KEY, Match, Options, Outcome, eval_pattern};
pub use error::MatchError;
pub use functions::{Factory, Registry, TestFn, alias, default_aggregators, default_operators};
pub use path::{PathSegment, path_to_string};
pub use pattern::{Pattern, PredicateFn};

use serde_json::Value;

/// Matches `pattern` against `data`.
///
/// Returns the merged capture bindings on success (an empty map if the
/// pattern matched but captured nothing) and `None` on match failure.
/// `Err` is reserved for configuration errors — malformed directives or
/// operator arguments — and never signals a failed match. Note the
/// degenerate array cases: an empty array with no aggregate keys produces
/// no results and therefore does not match, and a pattern with neither
/// element keys nor aggregate keys never matches an array (an empty pattern
/// still matches any non-array value vacuously).
///
/// `options.aliases`, when present, renames both operator tables once
/// before matching begins.
pub fn evaluate(
    pattern: &Pattern,
    data: &Value,
    options: &Options,
) -> Result<Option<Bindings>, MatchError> {
    let prepared;
    let options = match &options.aliases {
        Some(renames) => {
            prepared = Options {
                ops: alias(&options.ops, renames),
                aggregators: alias(&options.aggregators, renames),
                first: options.first,
                aliases: None,
            };
            &prepared
        }
        None => options,
    };
    Ok(eval_pattern(&[], pattern, data, options)?.map(|m| m.bindings))
}

/// Convenience wrapper: does `pattern` match `data` at all?
pub fn matches(pattern: &Pattern, data: &Value, options: &Options) -> Result<bool, MatchError> {
    Ok(evaluate(pattern, data, options)?.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_evaluate_returns_empty_bindings_on_plain_match() {
        let pattern = Pattern::from(json!({"a": 1}));
        let bindings = evaluate(&pattern, &json!({"a": 1}), &Options::default())
            .unwrap()
            .expect("pattern matches");
        assert!(bindings.is_empty());
    }

    #[test]
    fn test_evaluate_returns_none_on_mismatch() {
        let pattern = Pattern::from(json!({"a": 1}));
        let result = evaluate(&pattern, &json!({"a": 2}), &Options::default()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_call_level_aliases_apply_to_both_tables() {
        let options = Options {
            aliases: Some(
                [
                    ("$gt".to_string(), "$over".to_string()),
                    ("_$count".to_string(), "_$len".to_string()),
                ]
                .into_iter()
                .collect(),
            ),
            ..Options::default()
        };
        let pattern = Pattern::from(json!({"list": {"_$len": {"$over": 2}}}));
        let data = json!({"list": [1, 2, 3]});
        assert!(matches(&pattern, &data, &options).unwrap());
    }

    #[test]
    fn test_matches_wrapper() {
        let pattern = Pattern::from(json!({"n": {"$lt": 10}}));
        assert!(matches(&pattern, &json!({"n": 3}), &Options::default()).unwrap());
        assert!(!matches(&pattern, &json!({"n": 30}), &Options::default()).unwrap());
    }
}
