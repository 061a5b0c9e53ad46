//! Dynamic-response evaluation core for mock servers.
//!
//! Turns a static mock definition into a per-request computed answer,
//! via two request-scoped capabilities:
//!
//! - **Template expressions**: `${...}` placeholders in configuration
//!   strings (headers, bodies, etc.) are substituted with values pulled
//!   from pluggable, namespaced evaluators: request data (`context.*`),
//!   wall-clock time (`datetime.*`), or extension-supplied data. The
//!   resolved value can be projected through a JSON path query
//!   (`:$<path>`) or defaulted with a fallback literal (`:-<literal>`).
//! - **Script execution**: user-supplied scripts (files or inline
//!   strings) are compiled once per identity into reusable artifacts,
//!   cached under a bounded LRU with single-flight semantics, executed
//!   against per-request bindings, and their failures reported at
//!   user-visible source lines.
//!
//! The HTTP listener, request routing, state-store backends, and the
//! concrete embedded scripting engine are external collaborators,
//! consumed only through the traits at this crate's boundary.
//!
//! # Template example
//!
//! ```
//! use mock_dynamic_core::evaluator::{EvalContext, EvaluatorRegistry};
//! use mock_dynamic_core::expression;
//! use mock_dynamic_core::request::RequestContext;
//!
//! let registry = EvaluatorRegistry::builtin();
//! let mut request = RequestContext::default();
//! request.headers.insert("X-User".to_string(), "alice".to_string());
//! let ctx = EvalContext::for_request(&request);
//!
//! let body = expression::eval(
//!     r#"{"user":"${context.request.headers.X-User}"}"#,
//!     &registry,
//!     &ctx,
//!     None,
//! );
//! assert_eq!(body, r#"{"user":"alice"}"#);
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod expression;
pub mod request;
pub mod runtime;
pub mod script;

pub use config::{DynamicConfig, ScriptSettings};
pub use error::ScriptError;
pub use evaluator::{EvalContext, Evaluator, EvaluatorRegistry};
pub use request::RequestContext;
pub use runtime::{ResponseBehaviour, RuntimeContext, ScriptRuntime};
pub use script::ScriptEngine;
