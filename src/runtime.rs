//! Embedded script runtime boundary.
//!
//! The concrete scripting engine is an external collaborator: this module
//! defines the [`ScriptRuntime`] capability it must provide (compile a
//! source string into a reusable artifact, execute an artifact against a
//! set of bindings), plus the request-scoped bindings and the mutable
//! response-behaviour builder exposed to executing scripts.

use crate::request::RequestContext;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Value type crossing the script boundary.
pub type ScriptValue = serde_json::Value;

/// Failure reported by the underlying runtime, with the line number as the
/// runtime saw it (relative to the compiled source, prelude included).
#[derive(Debug, Clone)]
pub struct RuntimeError {
    /// Failure detail
    pub message: String,
    /// One-based line in the compiled source, when the runtime reports one
    pub line: Option<u32>,
}

impl RuntimeError {
    /// Build an error with no line information.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
        }
    }

    /// Build an error located at a line of the compiled source.
    pub fn at_line(message: impl Into<String>, line: u32) -> Self {
        Self {
            message: message.into(),
            line: Some(line),
        }
    }
}

/// An embeddable script engine.
///
/// Artifacts are reusable across invocations but are not assumed
/// reentrant: the executor confines each artifact's invocations to one
/// worker at a time. Bindings are isolated per call.
pub trait ScriptRuntime: Send + Sync {
    /// Compiled form of a script, reusable across executions.
    type Artifact: Send + Sync;

    /// Lines injected ahead of user source in file-backed scripts,
    /// providing the engine's convenience surface and output-capture shim.
    /// Empty by default; when non-empty, reported line numbers are
    /// corrected by the injected line count.
    fn prelude(&self) -> &str {
        ""
    }

    /// Compile source text into an executable artifact.
    fn compile(&self, source: &str) -> Result<Self::Artifact, RuntimeError>;

    /// Execute a compiled artifact against the bindings, returning the
    /// script's final evaluated value.
    fn execute(&self, artifact: &Self::Artifact, bindings: &Bindings)
        -> Result<ScriptValue, RuntimeError>;
}

/// Request-scoped bundle of everything a script may read or write.
/// Owned exclusively by one execution.
pub struct RuntimeContext {
    /// Read view of the current request
    pub request: RequestContext,
    /// Store access for scripts
    pub stores: Arc<dyn StoreProvider>,
}

impl RuntimeContext {
    /// Build a context backed by ephemeral in-memory stores.
    pub fn new(request: RequestContext) -> Self {
        Self {
            request,
            stores: Arc::new(InMemoryStoreProvider::new()),
        }
    }

    /// Replace the store provider.
    pub fn with_stores(mut self, stores: Arc<dyn StoreProvider>) -> Self {
        self.stores = stores;
        self
    }
}

/// Binding set handed to the runtime for one execution.
pub struct Bindings {
    /// Read view of the current request
    pub request: RequestContext,
    /// Mutable response-behaviour builder; present only for file-backed
    /// scripts, which carry the convenience surface
    pub response: Option<Arc<Mutex<ResponseBehaviour>>>,
    /// Store access
    pub stores: Arc<dyn StoreProvider>,
    /// Logging sink usable from script code
    pub logger: ScriptLogger,
}

impl Bindings {
    /// Bindings for a file-backed script: full surface, including the
    /// response-behaviour builder.
    pub(crate) fn with_dsl(context: RuntimeContext, script_id: &str) -> Self {
        Self {
            request: context.request,
            response: Some(Arc::new(Mutex::new(ResponseBehaviour::default()))),
            stores: context.stores,
            logger: ScriptLogger::new(script_id),
        }
    }

    /// Bindings for an inline script: no convenience surface.
    pub(crate) fn plain(context: RuntimeContext, script_id: &str) -> Self {
        Self {
            request: context.request,
            response: None,
            stores: context.stores,
            logger: ScriptLogger::new(script_id),
        }
    }

    /// Extract the response behaviour mutated by the script.
    pub(crate) fn into_response(self) -> ResponseBehaviour {
        match self.response {
            Some(response) => response.lock().clone(),
            None => ResponseBehaviour::default(),
        }
    }
}

/// Mutable response description built up by script code.
///
/// The shape mirrors what the host's response pipeline consumes: status,
/// headers, body content or file reference, and an artificial delay.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseBehaviour {
    /// HTTP status code, when overridden by the script
    pub status_code: Option<u16>,
    /// Response headers set by the script
    pub headers: HashMap<String, String>,
    /// Literal response content
    pub content: Option<String>,
    /// Response file reference, resolved by the host
    pub file: Option<String>,
    /// Artificial delay before the response is sent, in milliseconds
    pub delay_ms: Option<u64>,
}

impl ResponseBehaviour {
    /// Set the response status code.
    pub fn with_status_code(&mut self, status_code: u16) -> &mut Self {
        self.status_code = Some(status_code);
        self
    }

    /// Add a response header.
    pub fn with_header(&mut self, name: &str, value: &str) -> &mut Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    /// Set literal response content.
    pub fn with_content(&mut self, content: &str) -> &mut Self {
        self.content = Some(content.to_string());
        self
    }

    /// Respond with the contents of a file.
    pub fn with_file(&mut self, file: &str) -> &mut Self {
        self.file = Some(file.to_string());
        self
    }

    /// Delay the response by the given number of milliseconds.
    pub fn with_delay_ms(&mut self, delay_ms: u64) -> &mut Self {
        self.delay_ms = Some(delay_ms);
        self
    }
}

/// Named key-value store accessible from scripts.
pub trait Store: Send + Sync {
    /// Load the value for a key.
    fn load(&self, key: &str) -> Option<ScriptValue>;
    /// Save a value under a key.
    fn save(&self, key: &str, value: ScriptValue);
    /// Delete a key.
    fn delete(&self, key: &str);
    /// Whether a key is present.
    fn has(&self, key: &str) -> bool;
}

/// Opens named stores. Persistent backends are supplied by the host; the
/// in-memory provider here is the default ephemeral backend.
pub trait StoreProvider: Send + Sync {
    /// Open (creating if needed) the store with the given name.
    fn open(&self, name: &str) -> Arc<dyn Store>;
}

/// Ephemeral store provider holding everything in process memory.
pub struct InMemoryStoreProvider {
    stores: RwLock<HashMap<String, Arc<InMemoryStore>>>,
}

impl InMemoryStoreProvider {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self {
            stores: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryStoreProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreProvider for InMemoryStoreProvider {
    fn open(&self, name: &str) -> Arc<dyn Store> {
        if let Some(store) = self.stores.read().get(name) {
            return Arc::clone(store) as Arc<dyn Store>;
        }
        let mut stores = self.stores.write();
        let store = stores
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(InMemoryStore::default()));
        Arc::clone(store) as Arc<dyn Store>
    }
}

/// In-memory store backing [`InMemoryStoreProvider`].
#[derive(Default)]
pub struct InMemoryStore {
    items: RwLock<HashMap<String, ScriptValue>>,
}

impl Store for InMemoryStore {
    fn load(&self, key: &str) -> Option<ScriptValue> {
        self.items.read().get(key).cloned()
    }

    fn save(&self, key: &str, value: ScriptValue) {
        self.items.write().insert(key.to_string(), value);
    }

    fn delete(&self, key: &str) {
        self.items.write().remove(key);
    }

    fn has(&self, key: &str) -> bool {
        self.items.read().contains_key(key)
    }
}

/// Logging sink exposed to script code, forwarding to the host log with
/// the script identity attached.
#[derive(Clone)]
pub struct ScriptLogger {
    script_id: Arc<str>,
}

impl ScriptLogger {
    fn new(script_id: &str) -> Self {
        Self {
            script_id: Arc::from(script_id),
        }
    }

    /// Log at debug level.
    pub fn debug(&self, message: &str) {
        debug!(script_id = %self.script_id, "{message}");
    }

    /// Log at info level.
    pub fn info(&self, message: &str) {
        info!(script_id = %self.script_id, "{message}");
    }

    /// Log at warn level.
    pub fn warn(&self, message: &str) {
        warn!(script_id = %self.script_id, "{message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_behaviour_builder() {
        let mut behaviour = ResponseBehaviour::default();
        behaviour
            .with_status_code(201)
            .with_header("Content-Type", "application/json")
            .with_content(r#"{"ok":true}"#)
            .with_delay_ms(250);

        assert_eq!(behaviour.status_code, Some(201));
        assert_eq!(
            behaviour.headers.get("Content-Type"),
            Some(&"application/json".to_string())
        );
        assert_eq!(behaviour.content.as_deref(), Some(r#"{"ok":true}"#));
        assert_eq!(behaviour.delay_ms, Some(250));
        assert_eq!(behaviour.file, None);
    }

    #[test]
    fn test_in_memory_store_round_trip() {
        let provider = InMemoryStoreProvider::new();
        let store = provider.open("captures");

        assert!(!store.has("key"));
        store.save("key", serde_json::json!({"n": 1}));
        assert!(store.has("key"));
        assert_eq!(store.load("key"), Some(serde_json::json!({"n": 1})));

        store.delete("key");
        assert!(store.load("key").is_none());
    }

    #[test]
    fn test_store_provider_returns_same_store_by_name() {
        let provider = InMemoryStoreProvider::new();
        provider.open("shared").save("k", serde_json::json!("v"));

        assert_eq!(
            provider.open("shared").load("k"),
            Some(serde_json::json!("v"))
        );
        assert!(provider.open("other").load("k").is_none());
    }
}
