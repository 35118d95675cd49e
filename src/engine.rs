//! The recursive pattern evaluator.
//!
//! Evaluation is a plain synchronous descent over (pattern, data). Each call
//! produces an [`Outcome`]: `None` is the distinguished "no match" value,
//! `Some(Match)` carries the matched (or derived) value plus any captured
//! bindings. Success is definedness, never payload truthiness — `0`,
//! `false`, `""` and `null` are all valid success payloads. Configuration
//! errors (malformed directives or operator arguments) are reported
//! fail-fast as `Err`, and are never conflated with match failure.

use crate::error::MatchError;
use crate::functions::{self, Factory, Registry, TestFn};
use crate::path::{PathSegment, path_to_string};
use crate::pattern::Pattern;
use indexmap::IndexMap;
use serde_json::Value;

/// Captured bindings, in capture order.
pub type Bindings = IndexMap<String, Value>;

/// A successful match outcome: the matched (or derived) value plus any
/// bindings captured while matching. Empty bindings are a plain success.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub value: Value,
    pub bindings: Bindings,
}

impl Match {
    /// A success carrying `value` and no bindings.
    pub fn plain(value: Value) -> Self {
        Match { value, bindings: Bindings::new() }
    }
}

/// The result of one pattern evaluation; `None` means no match.
pub type Outcome = Option<Match>;

/// Reserved pattern key: pattern-local operator/aggregator renames.
pub const ALIAS_KEY: &str = "$$alias";
/// Reserved pattern key: per-array first-match-only override.
pub const FIRST_KEY: &str = "$first";
/// Reserved key inside a compound operator specification: constructor args.
pub const ARGS_KEY: &str = "args";

/// Per-evaluation configuration, threaded immutably through recursion.
///
/// A pattern-local `$$alias` directive produces a derived copy scoped to
/// that subtree; the caller's options are never mutated.
#[derive(Clone)]
pub struct Options {
    /// Operator table consulted for keys of item-level patterns.
    pub ops: Registry,
    /// Aggregator table consulted for keys of array-level patterns.
    pub aggregators: Registry,
    /// If true, array matching stops scanning after the first element match.
    pub first: bool,
    /// Optional renames applied to both tables before matching begins.
    pub aliases: Option<IndexMap<String, String>>,
}

impl Default for Options {
    /// Options wired to the built-in operator and aggregator tables.
    fn default() -> Self {
        Options {
            ops: functions::default_operators(),
            aggregators: functions::default_aggregators(),
            first: false,
            aliases: None,
        }
    }
}

/// Evaluates `pattern` against `data` at `path`.
///
/// Object patterns dispatch on the shape of the data: ordered sequences go
/// to the array evaluator, everything else to the item evaluator. Literal
/// and predicate patterns test the current value directly.
pub fn eval_pattern(
    path: &[PathSegment],
    pattern: &Pattern,
    data: &Value,
    options: &Options,
) -> Result<Outcome, MatchError> {
    match pattern {
        Pattern::Literal(expected) => {
            Ok(values_equal(expected, data).then(|| Match::plain(data.clone())))
        }
        Pattern::Predicate(pred) => Ok(pred(data).then(|| Match::plain(data.clone()))),
        Pattern::Object(map) => {
            let derived;
            let options = match map.get(ALIAS_KEY) {
                Some(directive) => {
                    derived = derive_aliased(path, directive, options)?;
                    &derived
                }
                None => options,
            };
            if let Value::Array(items) = data {
                eval_array(path, map, items, data, options)
            } else {
                eval_item(path, map, data, options)
            }
        }
    }
}

/// Matches a non-array data value against an object pattern, key by key.
///
/// An operator key tests the value currently being matched, not a field
/// named after it; any other key descends into the data. The conjunction
/// short-circuits on the first failing key. An empty pattern succeeds
/// vacuously with the original data as its value.
fn eval_item(
    path: &[PathSegment],
    pattern: &IndexMap<String, Pattern>,
    data: &Value,
    options: &Options,
) -> Result<Outcome, MatchError> {
    let mut bindings = Bindings::new();
    let mut last = data.clone();

    for (pkey, pval) in pattern {
        if pkey == ALIAS_KEY {
            continue;
        }
        let result = if let Some(factory) = options.ops.get(pkey) {
            let test = build_test(pkey, factory, pval)?;
            test(data, path, options)?
        } else {
            let child = field(data, pkey);
            let mut child_path = path.to_vec();
            child_path.push(PathSegment::Key(pkey.clone()));
            match pval {
                Pattern::Object(_) => eval_pattern(&child_path, pval, child, options)?,
                Pattern::Predicate(pred) => pred(child).then(|| Match::plain(child.clone())),
                Pattern::Literal(expected) => {
                    values_equal(expected, child).then(|| Match::plain(child.clone()))
                }
            }
        };

        match result {
            None => return Ok(None),
            Some(m) => {
                bindings.extend(m.bindings);
                last = m.value;
            }
        }
    }

    Ok(Some(Match { value: last, bindings }))
}

/// Matches an array against an object pattern.
///
/// The pattern is partitioned into whole-array aggregate operations (keys
/// registered in the aggregator table) and a per-element item pattern.
/// Elements are scanned in order, stopping after the first success in
/// first-match mode. Aggregates then run against the entire original array,
/// in pattern key order; any aggregate failure fails the whole match. The
/// array matches only if the combined result list is non-empty. Two
/// degenerate cases follow: an empty array with no aggregate keys fails,
/// and an empty item pattern contributes no element results at all, so a
/// pattern with neither element keys nor aggregate keys never matches an
/// array.
fn eval_array(
    path: &[PathSegment],
    pattern: &IndexMap<String, Pattern>,
    items: &[Value],
    array: &Value,
    options: &Options,
) -> Result<Outcome, MatchError> {
    let mut first = options.first;
    let mut item_pattern: IndexMap<String, Pattern> = IndexMap::new();
    let mut aggregate_tests: Vec<TestFn> = Vec::new();

    for (pkey, pval) in pattern {
        if pkey == ALIAS_KEY {
            continue;
        }
        if pkey == FIRST_KEY {
            first = first_override(pval)?;
            continue;
        }
        match options.aggregators.get(pkey) {
            Some(factory) => aggregate_tests.push(build_test(pkey, factory, pval)?),
            None => {
                item_pattern.insert(pkey.clone(), pval.clone());
            }
        }
    }

    log::trace!(
        "array match at '{}': {} element keys, {} aggregates, first={}",
        path_to_string(path),
        item_pattern.len(),
        aggregate_tests.len(),
        first
    );

    let mut results: Vec<Match> = Vec::new();

    if !item_pattern.is_empty() {
        let element_pattern = Pattern::Object(item_pattern);
        for (i, element) in items.iter().enumerate() {
            let mut element_path = path.to_vec();
            element_path.push(PathSegment::Index(i));
            if let Some(m) = eval_pattern(&element_path, &element_pattern, element, options)? {
                results.push(m);
                if first {
                    break;
                }
            }
        }
    }

    // Aggregates see the entire original array, not the filtered matches.
    for test in &aggregate_tests {
        match test(array, path, options)? {
            None => return Ok(None),
            Some(m) => results.push(m),
        }
    }

    if results.is_empty() {
        return Ok(None);
    }
    Ok(Some(combine_results(array, results)))
}

/// Merges a non-empty list of successful outcomes into one: bindings are
/// merged in list order (last write wins) and the original value is kept as
/// the payload.
fn combine_results(value: &Value, results: Vec<Match>) -> Match {
    let mut bindings = Bindings::new();
    for m in results {
        bindings.extend(m.bindings);
    }
    Match { value: value.clone(), bindings }
}

/// Builds the test for operator `name` from its argument specification.
///
/// A map specification is the compound (second-order) form: its reserved
/// `args` entry constructs the primitive test, and the remaining keys form a
/// pattern applied to the primitive's result value. A literal `false`
/// negates the nullary primitive. Anything else is normalized into a plain
/// argument list and handed to the factory directly.
pub(crate) fn build_test(
    name: &str,
    factory: &Factory,
    spec: &Pattern,
) -> Result<TestFn, MatchError> {
    match spec {
        Pattern::Object(map) => {
            let mut rest = map.clone();
            let args = match rest.shift_remove(ARGS_KEY) {
                Some(arg_spec) => normalize_args(name, &arg_spec)?,
                None => Vec::new(),
            };
            let primitive = factory(&args)?;
            let rest = Pattern::Object(rest);
            Ok(Box::new(move |data, path, options| {
                match primitive(data, path, options)? {
                    // The remainder pattern constrains the primitive's result
                    // value; the primitive's own bindings do not surface.
                    Some(m) => eval_pattern(path, &rest, &m.value, options),
                    None => Ok(None),
                }
            }))
        }
        Pattern::Literal(Value::Bool(false)) => {
            let primitive = factory(&[])?;
            Ok(Box::new(move |data, path, options| {
                match primitive(data, path, options)? {
                    Some(_) => Ok(None),
                    None => Ok(Some(Match::plain(data.clone()))),
                }
            }))
        }
        other => {
            let args = normalize_args(name, other)?;
            factory(&args)
        }
    }
}

/// Normalizes an operator-argument specification into an argument list: an
/// array literal is used as-is, `null` is an empty list, any other literal
/// becomes a one-element list.
fn normalize_args(name: &str, spec: &Pattern) -> Result<Vec<Value>, MatchError> {
    match spec {
        Pattern::Literal(Value::Array(items)) => Ok(items.clone()),
        Pattern::Literal(Value::Null) => Ok(Vec::new()),
        Pattern::Literal(value) => Ok(vec![value.clone()]),
        _ => Err(MatchError::ArgsSpec {
            operator: name.to_string(),
            message: "operator arguments must be literal values".to_string(),
        }),
    }
}

/// Produces a derived options value with both tables renamed per the
/// `$$alias` directive, scoped to the current subtree.
fn derive_aliased(
    path: &[PathSegment],
    directive: &Pattern,
    options: &Options,
) -> Result<Options, MatchError> {
    let renames = alias_renames(directive)?;
    log::debug!(
        "deriving aliased operator tables at '{}' ({} renames)",
        path_to_string(path),
        renames.len()
    );
    Ok(Options {
        ops: functions::alias(&options.ops, &renames),
        aggregators: functions::alias(&options.aggregators, &renames),
        first: options.first,
        aliases: options.aliases.clone(),
    })
}

/// Reads a rename map out of a `$$alias` directive. Accepts both the
/// literal form and the object-pattern form `From<Value>` lifting produces.
fn alias_renames(directive: &Pattern) -> Result<IndexMap<String, String>, MatchError> {
    match directive {
        Pattern::Literal(Value::Object(map)) => map
            .iter()
            .map(|(old, new)| match new {
                Value::String(new) => Ok((old.clone(), new.clone())),
                other => Err(MatchError::AliasDirective(format!(
                    "rename target for '{}' must be a string, got {}",
                    old, other
                ))),
            })
            .collect(),
        Pattern::Object(map) => map
            .iter()
            .map(|(old, new)| match new {
                Pattern::Literal(Value::String(new)) => Ok((old.clone(), new.clone())),
                other => Err(MatchError::AliasDirective(format!(
                    "rename target for '{}' must be a string, got {:?}",
                    old, other
                ))),
            })
            .collect(),
        _ => Err(MatchError::AliasDirective(
            "expected an object of old-name to new-name strings".to_string(),
        )),
    }
}

fn first_override(spec: &Pattern) -> Result<bool, MatchError> {
    match spec {
        Pattern::Literal(Value::Bool(b)) => Ok(*b),
        other => Err(MatchError::FirstDirective(format!(
            "expected a boolean literal, got {:?}",
            other
        ))),
    }
}

/// Looks a field up on the data, treating anything absent (or any
/// non-object data) as `Null`.
fn field<'a>(data: &'a Value, key: &str) -> &'a Value {
    static NULL: Value = Value::Null;
    data.get(key).unwrap_or(&NULL)
}

/// Loose JSON equality: numbers compare numerically across integer/float
/// representations, containers compare element-wise.
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval(pattern: serde_json::Value, data: serde_json::Value) -> Outcome {
        let pattern = Pattern::from(pattern);
        eval_pattern(&[], &pattern, &data, &Options::default()).expect("configuration is valid")
    }

    #[test]
    fn test_empty_pattern_is_vacuous_success() {
        let outcome = eval(json!({}), json!({"a": 1})).expect("must match");
        assert_eq!(outcome.value, json!({"a": 1}));
        assert!(outcome.bindings.is_empty());
    }

    #[test]
    fn test_operator_key_tests_current_value() {
        // $isNumber applies to the value at `b`, not to a field named
        // "$isNumber" below it.
        assert!(eval(json!({"b": {"$isNumber": true}}), json!({"b": 1})).is_some());
        assert!(eval(json!({"b": {"$isNumber": true}}), json!({"b": "x"})).is_none());
    }

    #[test]
    fn test_conjunction_short_circuits() {
        assert!(eval(json!({"a": 1, "b": 2}), json!({"a": 1, "b": 2})).is_some());
        assert!(eval(json!({"a": 1, "b": 3}), json!({"a": 1, "b": 2})).is_none());
    }

    #[test]
    fn test_numeric_equality_across_representations() {
        assert!(eval(json!({"n": 1}), json!({"n": 1.0})).is_some());
        assert!(eval(json!({"n": 1}), json!({"n": 1.5})).is_none());
    }

    #[test]
    fn test_missing_field_is_null() {
        assert!(eval(json!({"z": 3}), json!({"a": 1})).is_none());
        assert!(eval(json!({"z": null}), json!({"a": 1})).is_some());
        assert!(eval(json!({"z": {"$isNull": true}}), json!({"a": 1})).is_some());
    }

    #[test]
    fn test_predicate_pattern() {
        let pattern = Pattern::object([(
            "a",
            Pattern::predicate(|v: &Value| v.is_number()),
        )]);
        let options = Options::default();
        assert!(
            eval_pattern(&[], &pattern, &json!({"a": 5}), &options)
                .unwrap()
                .is_some()
        );
        assert!(
            eval_pattern(&[], &pattern, &json!({"a": "x"}), &options)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_empty_array_with_no_aggregates_fails() {
        assert!(eval(json!({"a": 1}), json!([])).is_none());
        assert!(eval(json!({}), json!([])).is_none());
    }

    #[test]
    fn test_empty_item_pattern_never_matches_an_array() {
        // An empty item pattern contributes no element results, so without
        // aggregate keys the match fails even on a non-empty array.
        assert!(eval(json!({}), json!([1, 2, 3])).is_none());
        // With an aggregate key the aggregate outcome alone carries it.
        assert!(eval(json!({"_$count": {"$gte": 3}}), json!([1, 2, 3])).is_some());
    }

    #[test]
    fn test_array_element_match_collects_captures() {
        let outcome = eval(
            json!({"kind": "b", "id": {"$capture": "hit"}}),
            json!([{"kind": "a", "id": 1}, {"kind": "b", "id": 2}]),
        )
        .expect("must match");
        assert_eq!(outcome.bindings["hit"], json!(2));
        // The combined outcome keeps the original array as its value.
        assert!(outcome.value.is_array());
    }

    #[test]
    fn test_first_override_stops_scanning() {
        let outcome = eval(
            json!({"$first": true, "id": {"$capture": "hit"}}),
            json!([{"id": 1}, {"id": 2}]),
        )
        .expect("must match");
        assert_eq!(outcome.bindings["hit"], json!(1));
    }

    #[test]
    fn test_aggregate_failure_gates_whole_match() {
        // Every element matches, but the count constraint fails.
        let outcome = eval(
            json!({"$isNumber": true, "_$count": {"$gte": 5}}),
            json!([1, 2, 3]),
        );
        assert!(outcome.is_none());
    }

    #[test]
    fn test_second_order_count() {
        assert!(eval(json!({"list": {"_$count": {"$gte": 3}}}), json!({"list": [1, 2, 3, 4]})).is_some());
        assert!(eval(json!({"list": {"_$count": {"$gte": 3}}}), json!({"list": [1, 2]})).is_none());
    }

    #[test]
    fn test_second_order_count_of_zero_is_success() {
        // A derived value of 0 is a success payload, not a failure.
        let outcome = eval(json!({"list": {"_$count": {"$lte": 0}}}), json!({"list": []}));
        assert!(outcome.is_some());
    }

    #[test]
    fn test_negation_sugar() {
        assert!(eval(json!({"val": {"$isNumber": false}}), json!({"val": "str"})).is_some());
        assert!(eval(json!({"val": {"$isNumber": false}}), json!({"val": 4})).is_none());
    }

    #[test]
    fn test_capture_collision_last_write_wins() {
        let outcome = eval(
            json!({"a": {"$capture": "x"}, "b": {"$capture": "x"}}),
            json!({"a": 1, "b": 2}),
        )
        .expect("must match");
        assert_eq!(outcome.bindings["x"], json!(2));
        assert_eq!(outcome.bindings.len(), 1);
    }

    #[test]
    fn test_alias_directive_scopes_to_subtree() {
        let pattern = json!({
            "a": {"$$alias": {"$gt": "$over"}, "$over": 5},
            "b": {"$gt": 1}
        });
        assert!(eval(pattern.clone(), json!({"a": 6, "b": 2})).is_some());
        assert!(eval(pattern, json!({"a": 5, "b": 2})).is_none());
    }

    #[test]
    fn test_alias_directive_removes_old_name() {
        // Once renamed, the old operator name falls through to field lookup.
        let pattern = json!({"a": {"$$alias": {"$gt": "$over"}, "$gt": 5}});
        assert!(eval(pattern, json!({"a": 6})).is_none());
    }

    #[test]
    fn test_malformed_alias_directive_is_an_error() {
        let pattern = Pattern::from(json!({"$$alias": "oops"}));
        let err = eval_pattern(&[], &pattern, &json!({}), &Options::default());
        assert!(matches!(err, Err(MatchError::AliasDirective(_))));
    }

    #[test]
    fn test_malformed_first_directive_is_an_error() {
        let pattern = Pattern::from(json!({"$first": 1}));
        let err = eval_pattern(&[], &pattern, &json!([1]), &Options::default());
        assert!(matches!(err, Err(MatchError::FirstDirective(_))));
    }

    #[test]
    fn test_values_equal_containers() {
        assert!(values_equal(&json!([1, {"a": 2}]), &json!([1.0, {"a": 2.0}])));
        assert!(!values_equal(&json!([1]), &json!([1, 2])));
        assert!(!values_equal(&json!({"a": 1}), &json!({"a": 1, "b": 2})));
    }
}
