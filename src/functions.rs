//! Defines the operator/aggregator registry, alias rewriting, and the
//! built-in implementations.
//!
//! An operator factory turns constructor arguments into a test applied at
//! the position its name is keyed under; an aggregator factory produces a
//! test (or derivation) over a whole array. The engine treats both tables as
//! opaque capability maps and builds second-order tests on top of them.

use crate::engine::{Bindings, Match, Options, Outcome, values_equal};
use crate::error::MatchError;
use crate::path::{PathSegment, format_capture_key, path_to_string};
use crate::pattern::Pattern;
use indexmap::IndexMap;
use serde_json::{Value, json};
use std::cmp::Ordering;

/// A compiled test: the value at the current match position (or the whole
/// array, for aggregators), the path reached so far, and the active options.
pub type TestFn = Box<dyn Fn(&Value, &[PathSegment], &Options) -> Result<Outcome, MatchError>>;

/// An operator or aggregator factory: constructor arguments in, test out.
/// Malformed arguments are configuration errors, reported at construction.
pub type Factory = fn(&[Value]) -> Result<TestFn, MatchError>;

/// A registry of operator (or aggregator) factories, looked up by name.
/// Iteration order is insertion order, which `alias` preserves for
/// untouched keys.
#[derive(Clone)]
pub struct Registry {
    entries: IndexMap<String, Factory>,
}

impl Registry {
    /// Creates a new, empty registry.
    pub fn new() -> Self {
        Self { entries: IndexMap::new() }
    }

    /// Registers a factory under `name`, replacing any previous entry.
    pub fn register(&mut self, name: &str, factory: Factory) {
        self.entries.insert(name.to_string(), factory);
    }

    /// Finds a factory by name.
    pub fn get(&self, name: &str) -> Option<&Factory> {
        self.entries.get(name)
    }

    /// The registered names, in table order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns a renamed copy of a registry: every key present in `renames` is
/// removed and re-inserted under its mapped name (entry unchanged); keys
/// absent from `renames` pass through, and renames of unregistered names are
/// ignored. The input registry is never mutated.
pub fn alias(table: &Registry, renames: &IndexMap<String, String>) -> Registry {
    let mut entries = table.entries.clone();
    for (old, new) in renames {
        if let Some(factory) = entries.shift_remove(old) {
            entries.insert(new.clone(), factory);
        }
    }
    Registry { entries }
}

/// The built-in operator table.
pub fn default_operators() -> Registry {
    let mut ops = Registry::new();
    ops.register("$gt", op_gt);
    ops.register("$lt", op_lt);
    ops.register("$gte", op_gte);
    ops.register("$lte", op_lte);
    ops.register("$equals", op_equals);
    ops.register("$isNull", op_is_null);
    ops.register("$truthy", op_truthy);
    ops.register("$falsey", op_falsey);
    ops.register("$isArray", op_is_array);
    ops.register("$isNumber", op_is_number);
    ops.register("$isString", op_is_string);
    ops.register("$match", op_match);
    ops.register("$capture", capture_test);
    ops
}

/// The built-in aggregator table.
pub fn default_aggregators() -> Registry {
    let mut aggregators = Registry::new();
    aggregators.register("_$count", agg_count);
    aggregators.register("_$capture", capture_test);
    aggregators.register("_$max", agg_max);
    aggregators.register("_$min", agg_min);
    aggregators.register("_$sum", agg_sum);
    aggregators.register("_$sorted", agg_sorted);
    aggregators
}

// --- Value helpers ---

/// Orders two JSON values when they are comparable: numbers numerically,
/// strings lexicographically. Mixed or non-scalar pairs do not compare.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Script-style truthiness over JSON values: `false`, `0`, `""` and `null`
/// are falsy; everything else (including empty arrays and objects) is
/// truthy.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn single_arg<'a>(op: &str, args: &'a [Value]) -> Result<&'a Value, MatchError> {
    args.first().ok_or_else(|| MatchError::Operator {
        operator: op.to_string(),
        message: "expected one argument".to_string(),
    })
}

fn field_list(op: &str, args: &[Value]) -> Result<Vec<String>, MatchError> {
    let fields: Option<Vec<String>> = args
        .iter()
        .map(|a| a.as_str().map(str::to_owned))
        .collect();
    match fields {
        Some(fields) if !fields.is_empty() => Ok(fields),
        _ => Err(MatchError::Operator {
            operator: op.to_string(),
            message: "expected one or more field name strings".to_string(),
        }),
    }
}

fn fold_key(path: &[PathSegment], op: &str, field: &str) -> String {
    let mut key_path = path.to_vec();
    key_path.push(PathSegment::Key(op.to_string()));
    key_path.push(PathSegment::Key(field.to_string()));
    path_to_string(&key_path)
}

// --- Built-in operators ---

fn comparison(
    op: &'static str,
    args: &[Value],
    accept: fn(Ordering) -> bool,
) -> Result<TestFn, MatchError> {
    let bound = single_arg(op, args)?.clone();
    if !(bound.is_number() || bound.is_string()) {
        return Err(MatchError::Operator {
            operator: op.to_string(),
            message: format!("expected a number or string bound, got {}", bound),
        });
    }
    Ok(Box::new(move |data, _path, _options| {
        Ok(compare(data, &bound)
            .is_some_and(accept)
            .then(|| Match::plain(data.clone())))
    }))
}

fn op_gt(args: &[Value]) -> Result<TestFn, MatchError> {
    comparison("$gt", args, Ordering::is_gt)
}

fn op_lt(args: &[Value]) -> Result<TestFn, MatchError> {
    comparison("$lt", args, Ordering::is_lt)
}

fn op_gte(args: &[Value]) -> Result<TestFn, MatchError> {
    comparison("$gte", args, Ordering::is_ge)
}

fn op_lte(args: &[Value]) -> Result<TestFn, MatchError> {
    comparison("$lte", args, Ordering::is_le)
}

fn op_equals(args: &[Value]) -> Result<TestFn, MatchError> {
    let expected = single_arg("$equals", args)?.clone();
    Ok(Box::new(move |data, _path, _options| {
        Ok(values_equal(data, &expected).then(|| Match::plain(data.clone())))
    }))
}

fn op_is_null(_args: &[Value]) -> Result<TestFn, MatchError> {
    Ok(Box::new(|data, _path, _options| {
        Ok(data.is_null().then(|| Match::plain(Value::Null)))
    }))
}

fn op_truthy(_args: &[Value]) -> Result<TestFn, MatchError> {
    Ok(Box::new(|data, _path, _options| {
        Ok(is_truthy(data).then(|| Match::plain(data.clone())))
    }))
}

fn op_falsey(_args: &[Value]) -> Result<TestFn, MatchError> {
    Ok(Box::new(|data, _path, _options| {
        Ok((!is_truthy(data)).then(|| Match::plain(data.clone())))
    }))
}

fn op_is_array(_args: &[Value]) -> Result<TestFn, MatchError> {
    Ok(Box::new(|data, _path, _options| {
        Ok(data.is_array().then(|| Match::plain(data.clone())))
    }))
}

fn op_is_number(_args: &[Value]) -> Result<TestFn, MatchError> {
    Ok(Box::new(|data, _path, _options| {
        Ok(data.is_number().then(|| Match::plain(data.clone())))
    }))
}

fn op_is_string(_args: &[Value]) -> Result<TestFn, MatchError> {
    Ok(Box::new(|data, _path, _options| {
        Ok(data.is_string().then(|| Match::plain(data.clone())))
    }))
}

/// Applies a sub-pattern to the value at the current position. Useful for
/// matching a nested array against its own array-level pattern, e.g.
/// `{"list": {"$match": [{"$isArray": true, "_$count": {"$gte": 3}}]}}`.
fn op_match(args: &[Value]) -> Result<TestFn, MatchError> {
    let pattern = Pattern::from(single_arg("$match", args)?.clone());
    Ok(Box::new(move |data, path, options| {
        crate::engine::eval_pattern(path, &pattern, data, options)
    }))
}

/// Binds the value at the current position under a capture key. The key
/// argument may contain `{path}`, `{parent}` and `{index}` placeholders; a
/// missing or non-string argument falls back to the dotted path. Registered
/// both as the `$capture` operator and the `_$capture` aggregator.
fn capture_test(args: &[Value]) -> Result<TestFn, MatchError> {
    let template = args.first().and_then(Value::as_str).map(str::to_owned);
    Ok(Box::new(move |data, path, _options| {
        let key = match &template {
            Some(template) => format_capture_key(template, path),
            None => path_to_string(path),
        };
        let mut bindings = Bindings::new();
        bindings.insert(key, data.clone());
        Ok(Some(Match { value: data.clone(), bindings }))
    }))
}

// --- Built-in aggregators ---

/// Derives the element count of the array. Always succeeds; a count of `0`
/// is a valid success payload.
fn agg_count(_args: &[Value]) -> Result<TestFn, MatchError> {
    Ok(Box::new(|data, _path, _options| {
        let n = data.as_array().map_or(0, Vec::len);
        Ok(Some(Match::plain(json!(n))))
    }))
}

fn agg_max(args: &[Value]) -> Result<TestFn, MatchError> {
    fold_extreme("_$max", args, Ordering::is_gt)
}

fn agg_min(args: &[Value]) -> Result<TestFn, MatchError> {
    fold_extreme("_$min", args, Ordering::is_lt)
}

/// Folds the named fields across all elements, keeping the extreme value of
/// each and binding it under `<path>.<op>.<field>`. Fields with no
/// comparable values are omitted.
fn fold_extreme(
    op: &'static str,
    args: &[Value],
    keep: fn(Ordering) -> bool,
) -> Result<TestFn, MatchError> {
    let fields = field_list(op, args)?;
    Ok(Box::new(move |data, path, _options| {
        let Some(elements) = data.as_array() else {
            return Ok(None);
        };
        let mut folded = Bindings::new();
        for field in &fields {
            let mut best: Option<&Value> = None;
            for element in elements {
                let Some(candidate) = element.get(field) else {
                    continue;
                };
                if candidate.is_null() {
                    continue;
                }
                best = match best {
                    None => Some(candidate),
                    Some(current) => {
                        if compare(candidate, current).is_some_and(keep) {
                            Some(candidate)
                        } else {
                            Some(current)
                        }
                    }
                };
            }
            if let Some(value) = best {
                folded.insert(fold_key(path, op, field), value.clone());
            }
        }
        let value = Value::Object(folded.iter().map(|(k, v)| (k.clone(), v.clone())).collect());
        Ok(Some(Match { value, bindings: folded }))
    }))
}

/// Sums the numeric values of the named fields across all elements, binding
/// each total under `<path>._$sum.<field>`. Non-numeric values are skipped;
/// the sum over an empty array is `0`.
fn agg_sum(args: &[Value]) -> Result<TestFn, MatchError> {
    let fields = field_list("_$sum", args)?;
    Ok(Box::new(move |data, path, _options| {
        let Some(elements) = data.as_array() else {
            return Ok(None);
        };
        let mut sums = Bindings::new();
        for field in &fields {
            let total: f64 = elements
                .iter()
                .filter_map(|element| element.get(field))
                .filter_map(Value::as_f64)
                .sum();
            sums.insert(fold_key(path, "_$sum", field), json!(total));
        }
        let value = Value::Object(sums.iter().map(|(k, v)| (k.clone(), v.clone())).collect());
        Ok(Some(Match { value, bindings: sums }))
    }))
}

/// Derives a sorted copy of the array: by the given field key, or by element
/// value when no key is given. Incomparable pairs keep their relative order.
fn agg_sorted(args: &[Value]) -> Result<TestFn, MatchError> {
    let key = match args.first() {
        Some(Value::String(s)) => Some(s.clone()),
        None | Some(Value::Null) => None,
        Some(other) => {
            return Err(MatchError::Operator {
                operator: "_$sorted".to_string(),
                message: format!("expected a field name string, got {}", other),
            });
        }
    };
    Ok(Box::new(move |data, _path, _options| {
        let Some(elements) = data.as_array() else {
            return Ok(None);
        };
        let mut sorted = elements.clone();
        sorted.sort_by(|a, b| {
            let (x, y) = match &key {
                Some(k) => (
                    a.get(k).unwrap_or(&Value::Null),
                    b.get(k).unwrap_or(&Value::Null),
                ),
                None => (a, b),
            };
            compare(x, y).unwrap_or(Ordering::Equal)
        });
        Ok(Some(Match::plain(Value::Array(sorted))))
    }))
}
