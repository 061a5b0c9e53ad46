//! Template expression resolution.
//!
//! Substitutes `${...}` placeholders in mock configuration strings with
//! values resolved through the [`EvaluatorRegistry`](crate::evaluator::EvaluatorRegistry).
//! A placeholder body may carry one optional suffix after the first colon:
//! `:$<path>` projects the resolved value through a JSON path query, and
//! `:-<literal>` supplies a fallback used when resolution yields nothing.
//!
//! Resolution never fails the surrounding template: unresolvable
//! placeholders are logged and substitute the empty string.

use crate::evaluator::{EvalContext, EvaluatorRegistry};
use jsonpath_rust::JsonPath;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, trace, warn};

/// Matches instances of `${something}`, with the group being the
/// characters between the brackets. Non-greedy: the first `}` closes the
/// placeholder; nested braces are unsupported.
static PLACEHOLDER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{(.+?)\}").expect("placeholder pattern is valid"));

/// Applies a structured path expression to a resolved value, extracting a
/// sub-value. Projection is best-effort: a query that yields nothing
/// resolves to `None` and the caller falls back to the unprojected value.
pub trait PathQueryProvider: Send + Sync {
    /// Query `value` with the path expression, returning the extracted
    /// sub-value's string form.
    fn query(&self, value: &str, path: &str) -> Option<String>;
}

/// [`PathQueryProvider`] backed by JSON path queries over JSON text.
pub struct JsonPathQueryProvider;

impl PathQueryProvider for JsonPathQueryProvider {
    fn query(&self, value: &str, path: &str) -> Option<String> {
        let json: serde_json::Value = serde_json::from_str(value).ok()?;
        let query = JsonPath::try_from(path).ok()?;

        let found = match query.find(&json) {
            serde_json::Value::Null => return None,
            serde_json::Value::Array(items) => items.into_iter().next()?,
            other => other,
        };
        match found {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s),
            other => Some(other.to_string()),
        }
    }
}

/// Evaluates a template in the form `...${expression}...`, substituting
/// every placeholder. A template containing no placeholder delimiter is
/// returned unchanged; literal text between placeholders is preserved
/// byte-for-byte.
pub fn eval(
    expression: &str,
    evaluators: &EvaluatorRegistry,
    context: &EvalContext,
    path_query: Option<&dyn PathQueryProvider>,
) -> String {
    if !expression.contains("${") {
        return expression.to_string();
    }

    let mut result = String::with_capacity(expression.len());
    let mut last_end = 0;
    for captures in PLACEHOLDER_PATTERN.captures_iter(expression) {
        let placeholder = captures.get(0).expect("whole match always present");
        let body = captures.get(1).expect("group 1 always present").as_str();

        result.push_str(&expression[last_end..placeholder.start()]);
        if let Some(value) = eval_single(body, evaluators, context, path_query) {
            result.push_str(&value);
        }
        last_end = placeholder.end();
    }
    result.push_str(&expression[last_end..]);
    result
}

/// Evaluates a single placeholder body (without the template syntax
/// surrounding it), applying the optional path-query or fallback suffix.
fn eval_single(
    raw_item_key: &str,
    evaluators: &EvaluatorRegistry,
    context: &EvalContext,
    path_query: Option<&dyn PathQueryProvider>,
) -> Option<String> {
    let (item_key, json_path, fallback) = split_suffix(raw_item_key);

    let resolved = dispatch(item_key, evaluators, context).map(|value| {
        match (json_path, path_query) {
            // a query that yields nothing leaves the value unprojected
            (Some(path), Some(provider)) => provider.query(&value, path).unwrap_or(value),
            _ => value,
        }
    });
    resolved.or_else(|| fallback.map(String::from))
}

/// Splits a raw placeholder body into `(item key, path query, fallback)`.
///
/// The first colon introduces the suffix: `:$...` is a path query,
/// `:-...` is a fallback literal. Any other character after the colon
/// still truncates the item key but yields no suffix. A leading colon is
/// part of the item key itself.
fn split_suffix(raw_item_key: &str) -> (&str, Option<&str>, Option<&str>) {
    match raw_item_key.find(':') {
        Some(colon) if colon > 0 => {
            let (json_path, fallback) = match raw_item_key.as_bytes().get(colon + 1) {
                Some(b'$') => (Some(&raw_item_key[colon + 1..]), None),
                Some(b'-') => (None, Some(&raw_item_key[colon + 2..])),
                _ => (None, None),
            };
            (&raw_item_key[..colon], json_path, fallback)
        }
        _ => (raw_item_key, None, None),
    }
}

/// Dispatches an item key to the evaluator registered for its namespace
/// root, falling back to the wildcard evaluator if no exact match exists.
fn dispatch(
    item_key: &str,
    evaluators: &EvaluatorRegistry,
    context: &EvalContext,
) -> Option<String> {
    let root = item_key.split('.').next().filter(|root| !root.is_empty());
    trace!(expression = %item_key, "Evaluating expression");

    match evaluators.lookup(root) {
        Some(evaluator) => {
            trace!(
                evaluator = evaluator.name(),
                expression = %item_key,
                "Using expression evaluator"
            );
            let result = evaluator.eval(item_key, context);
            if result.is_none() {
                debug!(expression = %item_key, "Expression evaluated to null");
            }
            result
        }
        None => {
            warn!(expression = %item_key, "Unsupported expression");
            None
        }
    }
}
