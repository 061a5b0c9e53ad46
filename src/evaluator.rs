//! Pluggable placeholder evaluators.
//!
//! An [`Evaluator`] resolves the body of a `${...}` placeholder to a value.
//! Evaluators are registered by namespace root (the leading dot-separated
//! segment of the placeholder key) in an [`EvaluatorRegistry`], which is
//! assembled once at startup and read-only thereafter. A single reserved
//! `"*"` entry acts as the wildcard fallback when no exact root matches.

use crate::request::RequestContext;
use chrono::{SecondsFormat, Utc};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

/// Registry key for the wildcard evaluator.
pub const WILDCARD_ROOT: &str = "*";

/// Read-only data available to evaluators for one resolution call.
///
/// The shape is owned by the caller: the built-in evaluators only look at
/// the request view, while extension evaluators may read arbitrary values
/// from the `values` map.
#[derive(Default)]
pub struct EvalContext<'a> {
    /// Current request, when resolution happens inside a request scope
    pub request: Option<&'a RequestContext>,
    /// Extension-supplied values, keyed by namespace root
    pub values: HashMap<String, serde_json::Value>,
}

impl<'a> EvalContext<'a> {
    /// Build a context for request-scoped resolution.
    pub fn for_request(request: &'a RequestContext) -> Self {
        Self {
            request: Some(request),
            values: HashMap::new(),
        }
    }
}

/// A named capability that resolves a placeholder key to a value.
///
/// Implementations must never panic on malformed input: a key they cannot
/// interpret resolves to `None`, with a diagnostic log entry.
pub trait Evaluator: Send + Sync {
    /// Short name used in log output.
    fn name(&self) -> &str;

    /// Resolve `item_key` (the full dotted key, without template syntax or
    /// suffix) against the context, or `None` if it yields no value.
    fn eval(&self, item_key: &str, context: &EvalContext) -> Option<String>;
}

/// Maps namespace roots to evaluators, with a wildcard fallback slot.
pub struct EvaluatorRegistry {
    evaluators: HashMap<String, Arc<dyn Evaluator>>,
}

impl EvaluatorRegistry {
    /// An empty registry with no evaluators.
    pub fn empty() -> Self {
        Self {
            evaluators: HashMap::new(),
        }
    }

    /// A registry pre-populated with the built-in `context` and
    /// `datetime` evaluators.
    pub fn builtin() -> Self {
        Self::empty()
            .register("context", Arc::new(ContextEvaluator))
            .register("datetime", Arc::new(DateTimeEvaluator))
    }

    /// Register an evaluator under a namespace root. Use [`WILDCARD_ROOT`]
    /// to install the wildcard fallback. Keys are unique; a repeated root
    /// replaces the previous entry.
    pub fn register(mut self, root: &str, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluators.insert(root.to_string(), evaluator);
        self
    }

    /// Look up the evaluator for a namespace root, falling back to the
    /// wildcard entry if no exact match exists.
    pub fn lookup(&self, root: Option<&str>) -> Option<&Arc<dyn Evaluator>> {
        root.and_then(|r| self.evaluators.get(r))
            .or_else(|| self.evaluators.get(WILDCARD_ROOT))
    }
}

/// Resolves `context.request.<category>.<name>` against the current request.
pub struct ContextEvaluator;

impl Evaluator for ContextEvaluator {
    fn name(&self) -> &str {
        "context"
    }

    fn eval(&self, item_key: &str, context: &EvalContext) -> Option<String> {
        let parts: Vec<&str> = item_key.splitn(4, '.').collect();
        if parts.len() < 4 {
            warn!(expression = %item_key, "Could not parse context expression");
            return None;
        }

        let request = match context.request {
            Some(request) => request,
            None => {
                warn!(expression = %item_key, "No request in scope for context expression");
                return None;
            }
        };

        let value = match (parts[0], parts[1], parts[2]) {
            ("context", "request", "headers") => request.header(parts[3]),
            ("context", "request", "queryParams") => request.query_param(parts[3]),
            ("context", "request", "pathParams") => request.path_param(parts[3]),
            _ => {
                warn!(expression = %item_key, "Could not parse context expression");
                return None;
            }
        };
        value.map(String::from)
    }
}

/// Origin for the monotonic `datetime.now.nanos` counter.
static NANOS_ORIGIN: Lazy<Instant> = Lazy::new(Instant::now);

/// Resolves `datetime.now.<unit>` against the wall clock.
pub struct DateTimeEvaluator;

impl Evaluator for DateTimeEvaluator {
    fn name(&self) -> &str {
        "datetime"
    }

    fn eval(&self, item_key: &str, _context: &EvalContext) -> Option<String> {
        let parts: Vec<&str> = item_key.splitn(3, '.').collect();
        if parts.len() < 3 {
            warn!(expression = %item_key, "Could not parse datetime expression");
            return None;
        }

        match (parts[0], parts[1], parts[2]) {
            ("datetime", "now", "millis") => Some(Utc::now().timestamp_millis().to_string()),
            ("datetime", "now", "nanos") => Some(NANOS_ORIGIN.elapsed().as_nanos().to_string()),
            ("datetime", "now", "iso8601_date") => {
                Some(Utc::now().date_naive().format("%Y-%m-%d").to_string())
            }
            ("datetime", "now", "iso8601_datetime") => {
                Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            _ => {
                warn!(expression = %item_key, "Could not parse datetime expression");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_request() -> RequestContext {
        let mut request = RequestContext {
            method: "GET".to_string(),
            path: "/users/42".to_string(),
            ..Default::default()
        };
        request
            .headers
            .insert("X-Test".to_string(), "hello".to_string());
        request
            .query_params
            .insert("page".to_string(), "3".to_string());
        request
            .path_params
            .insert("id".to_string(), "42".to_string());
        request
    }

    #[test]
    fn test_context_evaluator_resolves_request_facets() {
        let request = test_request();
        let ctx = EvalContext::for_request(&request);
        let evaluator = ContextEvaluator;

        assert_eq!(
            evaluator.eval("context.request.headers.X-Test", &ctx),
            Some("hello".to_string())
        );
        assert_eq!(
            evaluator.eval("context.request.queryParams.page", &ctx),
            Some("3".to_string())
        );
        assert_eq!(
            evaluator.eval("context.request.pathParams.id", &ctx),
            Some("42".to_string())
        );
    }

    #[test]
    fn test_context_evaluator_malformed_shapes() {
        let request = test_request();
        let ctx = EvalContext::for_request(&request);
        let evaluator = ContextEvaluator;

        // too few segments
        assert_eq!(evaluator.eval("context.request.headers", &ctx), None);
        // unknown category
        assert_eq!(evaluator.eval("context.request.cookies.session", &ctx), None);
        // unknown second segment
        assert_eq!(evaluator.eval("context.response.headers.X-Test", &ctx), None);
        // absent header
        assert_eq!(evaluator.eval("context.request.headers.Missing", &ctx), None);
    }

    #[test]
    fn test_context_evaluator_without_request() {
        let ctx = EvalContext::default();
        assert_eq!(
            ContextEvaluator.eval("context.request.headers.X-Test", &ctx),
            None
        );
    }

    #[test]
    fn test_datetime_millis_and_nanos_are_decimal() {
        let ctx = EvalContext::default();
        let evaluator = DateTimeEvaluator;

        let millis = evaluator.eval("datetime.now.millis", &ctx).unwrap();
        assert!(millis.chars().all(|c| c.is_ascii_digit()));

        let nanos = evaluator.eval("datetime.now.nanos", &ctx).unwrap();
        assert!(nanos.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_datetime_iso8601_date_has_no_time_component() {
        let ctx = EvalContext::default();
        let date = DateTimeEvaluator
            .eval("datetime.now.iso8601_date", &ctx)
            .unwrap();

        // YYYY-MM-DD
        assert_eq!(date.len(), 10);
        assert_eq!(&date[4..5], "-");
        assert_eq!(&date[7..8], "-");
        assert!(!date.contains('T'));
    }

    #[test]
    fn test_datetime_iso8601_datetime_is_offset_datetime() {
        let ctx = EvalContext::default();
        let datetime = DateTimeEvaluator
            .eval("datetime.now.iso8601_datetime", &ctx)
            .unwrap();

        assert!(datetime.contains('T'));
        assert!(datetime.ends_with('Z'));
    }

    #[test]
    fn test_datetime_malformed_shapes() {
        let ctx = EvalContext::default();
        let evaluator = DateTimeEvaluator;

        assert_eq!(evaluator.eval("datetime.now", &ctx), None);
        assert_eq!(evaluator.eval("datetime.now.fortnights", &ctx), None);
        assert_eq!(evaluator.eval("datetime.yesterday.millis", &ctx), None);
    }

    #[test]
    fn test_registry_wildcard_fallback() {
        struct Fixed;
        impl Evaluator for Fixed {
            fn name(&self) -> &str {
                "fixed"
            }
            fn eval(&self, _: &str, _: &EvalContext) -> Option<String> {
                Some("fixed".to_string())
            }
        }

        let registry = EvaluatorRegistry::builtin().register(WILDCARD_ROOT, Arc::new(Fixed));

        assert_eq!(registry.lookup(Some("datetime")).unwrap().name(), "datetime");
        assert_eq!(registry.lookup(Some("unknown")).unwrap().name(), "fixed");
        assert_eq!(registry.lookup(None).unwrap().name(), "fixed");

        let without_wildcard = EvaluatorRegistry::builtin();
        assert!(without_wildcard.lookup(Some("unknown")).is_none());
    }
}
